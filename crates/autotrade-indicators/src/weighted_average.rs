//! Trapezoidal time-weighted average.

use autotrade_core::error::IndicatorError;

use crate::time_window::TimeWindow;

/// Time-weighted average over a [`TimeWindow`].
///
/// Each node is weighted by half the time distance to its left neighbour
/// plus half the distance to its right neighbour; the end nodes get their
/// single half-interval. Distances are measured in seconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedAverageCalculator;

impl WeightedAverageCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Weighted average of the window values.
    ///
    /// Falls back to the arithmetic mean when all nodes share one timestamp.
    pub fn calculate(&self, window: &TimeWindow) -> Result<f64, IndicatorError> {
        window.with_nodes(|nodes| {
            let n = nodes.len();
            match n {
                0 => return Err(IndicatorError::EmptyWindow),
                1 => return Ok(nodes[0].value),
                _ => {}
            }

            let mut weighted_sum = 0.0;
            let mut total_weight = 0.0;
            for i in 0..n {
                let left = if i > 0 {
                    seconds_between(nodes[i - 1].timestamp, nodes[i].timestamp)
                } else {
                    0.0
                };
                let right = if i + 1 < n {
                    seconds_between(nodes[i].timestamp, nodes[i + 1].timestamp)
                } else {
                    0.0
                };
                let weight = (left + right) / 2.0;
                weighted_sum += weight * nodes[i].value;
                total_weight += weight;
            }

            if total_weight == 0.0 {
                let sum: f64 = nodes.iter().map(|node| node.value).sum();
                return Ok(sum / n as f64);
            }
            Ok(weighted_sum / total_weight)
        })
    }
}

#[inline]
fn seconds_between(from: chrono::DateTime<chrono::Utc>, to: chrono::DateTime<chrono::Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};

    #[test]
    fn test_empty_window_is_an_error() {
        let window = TimeWindow::from_minutes(1);
        assert_eq!(
            WeightedAverageCalculator::new().calculate(&window),
            Err(IndicatorError::EmptyWindow)
        );
    }

    #[test]
    fn test_single_element() {
        let window = TimeWindow::from_minutes(1);
        window.append(7.5, Utc::now());
        assert_eq!(WeightedAverageCalculator::new().calculate(&window), Ok(7.5));
    }

    #[test]
    fn test_two_points_weigh_equally() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let window = TimeWindow::from_minutes(1);
        window.append(1.0, t0 + TimeDelta::seconds(15));
        window.append(3.0, t0 + TimeDelta::seconds(45));

        let avg = WeightedAverageCalculator::new().calculate(&window).unwrap();
        assert!((avg - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_middle_node_carries_both_half_intervals() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let window = TimeWindow::from_minutes(5);
        window.append(10.0, t0);
        window.append(20.0, t0 + TimeDelta::seconds(60));
        window.append(40.0, t0 + TimeDelta::seconds(180));

        // weights 30, 90, 60
        let expected = (30.0 * 10.0 + 90.0 * 20.0 + 60.0 * 40.0) / 180.0;
        let avg = WeightedAverageCalculator::new().calculate(&window).unwrap();
        assert!((avg - expected).abs() < 1e-9);
    }

    #[test]
    fn test_same_instant_falls_back_to_mean() {
        let now = Utc::now();
        let window = TimeWindow::from_minutes(1);
        for v in [1.0, 2.0, 6.0] {
            window.append(v, now);
        }
        let avg = WeightedAverageCalculator::new().calculate(&window).unwrap();
        assert!((avg - 3.0).abs() < 1e-9);
    }
}
