//! Sell gate that keeps a position until the exit covers both commissions.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BreakEvenGate {
    /// Commission rate charged per side
    commission: Decimal,
}

impl BreakEvenGate {
    pub fn new(commission: Decimal) -> Self {
        Self { commission }
    }

    /// Lowest exit price that is strictly profitable after commissions.
    pub fn min_exit_price(&self, buy_price: Decimal) -> Decimal {
        buy_price * (Decimal::ONE + dec!(2) * self.commission)
    }

    /// Check if selling at `price` is allowed.
    ///
    /// Without a recorded buy price any sell is allowed.
    pub fn allows_sell(&self, buy_price: Option<Decimal>, price: Decimal) -> bool {
        match buy_price {
            None => true,
            Some(buy) => buy < price && self.min_exit_price(buy) < price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sell_blocked_until_commissions_are_covered() {
        let gate = BreakEvenGate::new(dec!(0.01));
        assert_eq!(gate.min_exit_price(dec!(100)), dec!(102));

        assert!(!gate.allows_sell(Some(dec!(100)), dec!(99)));
        assert!(!gate.allows_sell(Some(dec!(100)), dec!(101)));
        assert!(!gate.allows_sell(Some(dec!(100)), dec!(102)));
        assert!(gate.allows_sell(Some(dec!(100)), dec!(102.01)));
    }

    #[test]
    fn test_sell_without_buy_price() {
        let gate = BreakEvenGate::new(dec!(0.0005));
        assert!(gate.allows_sell(None, dec!(1)));
    }
}
