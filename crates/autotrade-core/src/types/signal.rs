//! Trend signal frames.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{OrderType, Side};

/// Smoothed trend snapshot for one instrument at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalFrame {
    pub instrument_id: String,
    pub timestamp: DateTime<Utc>,
    /// Time-weighted average over the short window
    pub short_average: f64,
    /// Time-weighted average over the long window
    pub long_average: f64,
    /// Rate of change of the short average
    pub derivative: f64,
    /// Price of the tick that produced the frame
    pub price: f64,
}

impl SignalFrame {
    /// Short average minus long average.
    #[inline]
    pub fn diff(&self) -> f64 {
        self.short_average - self.long_average
    }

    /// Derivative relative to the short average.
    pub fn relative_derivative(&self) -> f64 {
        if self.short_average == 0.0 {
            0.0
        } else {
            self.derivative / self.short_average
        }
    }
}

/// Why a strategy wants to trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentReason {
    /// Short average crossed the long one (or kept rising steeply)
    Crossover,
    /// Price fell through the stop below the buy price
    StopLoss,
}

/// Order a strategy wants placed for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeIntent {
    pub instrument_id: String,
    pub direction: Side,
    pub order_type: OrderType,
    /// Limit price, or the reference price of a market order
    pub price: Decimal,
    /// Lots to trade; `None` lets the executor size the order
    pub lots: Option<i64>,
    pub reason: IntentReason,
}
