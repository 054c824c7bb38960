//! Conversions between signal prices (f64) and money (Decimal).

use num_traits::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Convert a signal price to a decimal, rounding away binary noise.
///
/// `None` for NaN and infinities.
pub fn price_to_decimal(price: f64) -> Option<Decimal> {
    Decimal::from_f64(price)
}

/// Convert a decimal amount to f64 for reporting and comparisons with signals.
pub fn decimal_to_price(amount: Decimal) -> f64 {
    amount.to_f64().unwrap_or(0.0)
}
