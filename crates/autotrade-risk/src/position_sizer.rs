//! Lot sizing and price normalisation.

use autotrade_core::types::Side;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

/// Sizes buy orders from a money budget.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LotSizer {
    /// Instrument units per lot
    lot: i64,
}

impl LotSizer {
    pub fn new(lot: i64) -> Self {
        Self { lot }
    }

    /// Whole lots affordable with `budget` at `price` per unit.
    ///
    /// Returns 0 for non-positive prices, lots or budgets.
    pub fn lots_for_budget(&self, budget: Decimal, price: Decimal) -> i64 {
        if price <= Decimal::ZERO || self.lot <= 0 || budget <= Decimal::ZERO {
            return 0;
        }
        let lot_cost = price * Decimal::from(self.lot);
        let lots = (budget / lot_cost).floor();
        let lots = lots.to_i64().unwrap_or(0);
        if lots == 0 {
            debug!(%budget, %price, lot = self.lot, "Budget does not cover a single lot");
        }
        lots
    }
}

/// Money needed for `lots` lots of `lot` units at `price` per unit.
pub fn order_cost(price: Decimal, lots: i64, lot: i64) -> Decimal {
    price * Decimal::from(lots) * Decimal::from(lot)
}

/// Snap `price` to a multiple of `increment`.
///
/// Buys round down and sells round up, so normalisation never makes an order
/// less favourable for the account. A non-positive increment leaves the price
/// unchanged.
pub fn normalize_price(price: Decimal, increment: Decimal, side: Side) -> Decimal {
    if increment <= Decimal::ZERO {
        return price;
    }
    let steps = price / increment;
    let steps = match side {
        Side::Buy => steps.floor(),
        Side::Sell => steps.ceil(),
    };
    (steps * increment).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_lots_for_budget() {
        let sizer = LotSizer::new(10);
        // 1000 / (25 * 10) = 4
        assert_eq!(sizer.lots_for_budget(dec!(1000), dec!(25)), 4);
        assert_eq!(sizer.lots_for_budget(dec!(1000), dec!(30)), 3);
        assert_eq!(sizer.lots_for_budget(dec!(100), dec!(30)), 0);
        assert_eq!(sizer.lots_for_budget(dec!(100), Decimal::ZERO), 0);
    }

    #[test]
    fn test_order_cost() {
        assert_eq!(order_cost(dec!(25.5), 4, 10), dec!(1020));
    }

    #[test]
    fn test_normalize_price_direction() {
        assert_eq!(normalize_price(dec!(100.037), dec!(0.01), Side::Buy), dec!(100.03));
        assert_eq!(normalize_price(dec!(100.031), dec!(0.01), Side::Sell), dec!(100.04));
        assert_eq!(normalize_price(dec!(100.05), dec!(0.05), Side::Sell), dec!(100.05));
        assert_eq!(normalize_price(dec!(7.3), Decimal::ZERO, Side::Buy), dec!(7.3));
    }
}
