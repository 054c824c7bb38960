//! Instrument, account and position types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::Side;

/// Static and session information about a tradable instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentInfo {
    pub instrument_id: String,
    pub ticker: String,
    /// Settlement currency, lowercase ISO code
    pub currency: String,
    /// Instrument units per lot
    pub lot: i64,
    /// Minimum price step
    pub min_price_increment: Decimal,
    /// Whether the instrument can be traded through the API at all
    pub api_trade_available: bool,
    pub buy_available: bool,
    pub sell_available: bool,
    /// Whether the trading session is currently open
    pub session_open: bool,
}

impl InstrumentInfo {
    /// Create an instrument that is open for trading in both directions.
    pub fn tradable(
        instrument_id: impl Into<String>,
        currency: impl Into<String>,
        lot: i64,
        min_price_increment: Decimal,
    ) -> Self {
        let instrument_id = instrument_id.into();
        Self {
            ticker: instrument_id.clone(),
            instrument_id,
            currency: currency.into(),
            lot,
            min_price_increment,
            api_trade_available: true,
            buy_available: true,
            sell_available: true,
            session_open: true,
        }
    }

    /// Check whether orders in `side` are permitted.
    pub fn allows(&self, side: Side) -> bool {
        match side {
            Side::Buy => self.buy_available,
            Side::Sell => self.sell_available,
        }
    }
}

/// Brokerage account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
}

/// Holdings of one instrument on an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityPosition {
    pub instrument_id: String,
    /// Balance in instrument units
    pub balance: i64,
    /// Units locked by open sell orders
    pub blocked: i64,
}

/// Account positions: free money per currency plus securities.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Positions {
    pub money: HashMap<String, Decimal>,
    pub blocked_money: HashMap<String, Decimal>,
    pub securities: Vec<SecurityPosition>,
}

impl Positions {
    /// Free money in `currency` (zero when the currency is absent).
    pub fn available_money(&self, currency: &str) -> Decimal {
        self.money.get(currency).copied().unwrap_or(Decimal::ZERO)
    }

    /// Units of `instrument_id` held on the account.
    pub fn security_balance(&self, instrument_id: &str) -> i64 {
        self.securities
            .iter()
            .find(|p| p.instrument_id == instrument_id)
            .map(|p| p.balance)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_instrument_direction_flags() {
        let mut info = InstrumentInfo::tradable("SBER", "rub", 10, dec!(0.01));
        assert!(info.allows(Side::Buy));
        info.sell_available = false;
        assert!(!info.allows(Side::Sell));
    }

    #[test]
    fn test_positions_lookups() {
        let mut positions = Positions::default();
        positions.money.insert("rub".into(), dec!(1500));
        positions.securities.push(SecurityPosition {
            instrument_id: "SBER".into(),
            balance: 30,
            blocked: 0,
        });

        assert_eq!(positions.available_money("rub"), dec!(1500));
        assert_eq!(positions.available_money("usd"), Decimal::ZERO);
        assert_eq!(positions.security_balance("SBER"), 30);
        assert_eq!(positions.security_balance("GAZP"), 0);
    }
}
