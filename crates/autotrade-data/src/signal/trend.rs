//! Per-instrument short/long window pair.

use autotrade_core::types::SignalFrame;
use autotrade_indicators::{TimeWindow, WeightedAverageCalculator};
use chrono::{DateTime, TimeDelta, Utc};

/// How the derivative of the short average is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeMode {
    /// Change per minute of tick time
    PerMinute,
    /// Change scaled by the number of samples in the short window
    WindowScaled,
}

/// Short and long windows of one instrument plus derivative bookkeeping.
#[derive(Debug)]
pub struct InstrumentTrend {
    instrument_id: String,
    short: TimeWindow,
    long: TimeWindow,
    calculator: WeightedAverageCalculator,
    mode: DerivativeMode,
    short_populated: bool,
    long_populated: bool,
    prev_short: Option<f64>,
    prev_time: Option<DateTime<Utc>>,
}

impl InstrumentTrend {
    pub fn new(
        instrument_id: impl Into<String>,
        short_minutes: i64,
        long_minutes: i64,
        mode: DerivativeMode,
    ) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            short: TimeWindow::new(TimeDelta::minutes(short_minutes)),
            long: TimeWindow::new(TimeDelta::minutes(long_minutes)),
            calculator: WeightedAverageCalculator::new(),
            mode,
            short_populated: false,
            long_populated: false,
            prev_short: None,
            prev_time: None,
        }
    }

    pub fn instrument_id(&self) -> &str {
        &self.instrument_id
    }

    /// Both windows have covered their whole duration at least once.
    pub fn is_populated(&self) -> bool {
        self.short_populated && self.long_populated
    }

    /// Feed one price.
    ///
    /// # Returns
    /// A frame once both windows are populated, `None` during warm-up
    pub fn push(&mut self, price: f64, time: DateTime<Utc>) -> Option<SignalFrame> {
        self.short_populated |= self.short.append(price, time);
        self.long_populated |= self.long.append(price, time);

        let short_average = self.calculator.calculate(&self.short).ok()?;
        let long_average = self.calculator.calculate(&self.long).ok()?;

        let derivative = match (self.prev_short, self.prev_time) {
            (Some(prev), Some(prev_time)) => self.derivative(short_average - prev, time - prev_time),
            _ => 0.0,
        };
        self.prev_short = Some(short_average);
        self.prev_time = Some(time);

        if !self.is_populated() {
            return None;
        }
        Some(SignalFrame {
            instrument_id: self.instrument_id.clone(),
            timestamp: time,
            short_average,
            long_average,
            derivative,
            price,
        })
    }

    fn derivative(&self, delta: f64, elapsed: TimeDelta) -> f64 {
        match self.mode {
            DerivativeMode::PerMinute => {
                let minutes = elapsed.num_milliseconds() as f64 / 60_000.0;
                if minutes <= 0.0 {
                    0.0
                } else {
                    delta / minutes
                }
            }
            DerivativeMode::WindowScaled => delta * self.short.len() as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_no_frames_before_both_windows_evicted() {
        let mut trend = InstrumentTrend::new("SBER", 1, 3, DerivativeMode::PerMinute);
        let mut first_frame = None;
        for minute in 0..10 {
            let frame = trend.push(100.0 + minute as f64, t0() + TimeDelta::minutes(minute));
            if frame.is_some() && first_frame.is_none() {
                first_frame = Some(minute);
            }
        }
        // the 3 minute window evicts on the append at minute 4
        assert_eq!(first_frame, Some(4));
        assert!(trend.is_populated());
    }

    #[test]
    fn test_per_minute_derivative() {
        let mut trend = InstrumentTrend::new("SBER", 1, 2, DerivativeMode::PerMinute);
        for minute in 0..4 {
            trend.push(100.0, t0() + TimeDelta::minutes(minute));
        }
        // the short window holds [100 @ 3m, 106 @ 4m] after eviction, average 103
        let frame = trend.push(106.0, t0() + TimeDelta::minutes(4)).unwrap();
        assert!((frame.short_average - 103.0).abs() < 1e-9);
        assert!((frame.derivative - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_gap_yields_zero_derivative() {
        let mut trend = InstrumentTrend::new("SBER", 1, 2, DerivativeMode::PerMinute);
        for minute in 0..4 {
            trend.push(100.0 + minute as f64, t0() + TimeDelta::minutes(minute));
        }
        let frame = trend.push(200.0, t0() + TimeDelta::minutes(3)).unwrap();
        assert_eq!(frame.derivative, 0.0);
    }

    #[test]
    fn test_window_scaled_derivative() {
        let mut trend = InstrumentTrend::new("SBER", 1, 2, DerivativeMode::WindowScaled);
        for minute in 0..4 {
            trend.push(100.0, t0() + TimeDelta::minutes(minute));
        }
        let frame = trend.push(101.0, t0() + TimeDelta::seconds(210)).unwrap();
        // short window: 100 @ 3m, 101 @ 3m30s, average 100.5, two samples
        assert!((frame.derivative - 1.0).abs() < 1e-9);
    }
}
