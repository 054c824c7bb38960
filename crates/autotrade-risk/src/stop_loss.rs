//! Stop-loss management.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Fixed-percent stop below the recorded buy price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopLossRule {
    pub enabled: bool,
    /// Distance below the buy price, in percent
    pub percent: Decimal,
}

impl Default for StopLossRule {
    fn default() -> Self {
        Self {
            enabled: false,
            percent: dec!(2),
        }
    }
}

impl StopLossRule {
    pub fn new(enabled: bool, percent: Decimal) -> Self {
        Self { enabled, percent }
    }

    /// Price at or below which the position is abandoned.
    pub fn stop_price(&self, buy_price: Decimal) -> Decimal {
        buy_price * (Decimal::ONE - self.percent / dec!(100))
    }

    /// Check if `current` fell to the stop derived from `buy_price`.
    ///
    /// Always `false` while the rule is disabled.
    pub fn is_triggered(&self, buy_price: Decimal, current: Decimal) -> bool {
        self.enabled && current <= self.stop_price(buy_price)
    }
}
