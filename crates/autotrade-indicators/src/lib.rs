//! Trend primitives.
//!
//! - [`TimeWindow`]: time-bounded buffer of timestamped values
//! - [`WeightedAverageCalculator`]: trapezoidal time-weighted average over a window

pub mod time_window;
pub mod weighted_average;

pub use time_window::{TimeWindow, WindowNode};
pub use weighted_average::WeightedAverageCalculator;
