//! Candle and history record types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::price::price_to_decimal;

/// OHLCV candle for a single instrument.
/// Prices are f64 for fast window calculations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Venue-specific instrument identifier
    pub instrument_id: String,
    /// Candle open time
    pub time: DateTime<Utc>,
    /// Opening price
    pub open: f64,
    /// Highest price
    pub high: f64,
    /// Lowest price
    pub low: f64,
    /// Closing price
    pub close: f64,
    /// Traded volume in lots
    pub volume: f64,
}

impl Candle {
    /// Create a candle where every price equals `price`.
    pub fn flat(instrument_id: impl Into<String>, time: DateTime<Utc>, price: f64) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            time,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: 0.0,
        }
    }

    /// Closing price as a decimal, when representable.
    pub fn close_decimal(&self) -> Option<Decimal> {
        price_to_decimal(self.close)
    }

    /// Check if the candle is bullish (close > open).
    #[inline]
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// Convert into the history record stored for backtests.
    pub fn to_record(&self) -> HistoryRecord {
        HistoryRecord {
            instrument_id: self.instrument_id.clone(),
            time: self.time,
            price: self.close,
        }
    }
}

/// One stored historical price point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub instrument_id: String,
    pub time: DateTime<Utc>,
    pub price: f64,
}

impl HistoryRecord {
    pub fn new(instrument_id: impl Into<String>, time: DateTime<Utc>, price: f64) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            time,
            price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_candle_to_record_uses_close() {
        let time = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        let candle = Candle {
            instrument_id: "SBER".into(),
            time,
            open: 100.0,
            high: 104.0,
            low: 99.0,
            close: 103.5,
            volume: 10.0,
        };

        let record = candle.to_record();
        assert_eq!(record.instrument_id, "SBER");
        assert_eq!(record.time, time);
        assert!((record.price - 103.5).abs() < f64::EPSILON);
        assert!(candle.is_bullish());
    }
}
