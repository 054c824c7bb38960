//! Per-currency money limits.

use autotrade_core::error::ValidationError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Maximum money an algorithm may commit to one buy, keyed by currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MoneyLimits(HashMap<String, Decimal>);

impl MoneyLimits {
    pub fn new(limits: HashMap<String, Decimal>) -> Self {
        Self(limits)
    }

    /// Limit for `currency`, or a validation failure when none is configured.
    pub fn for_currency(&self, currency: &str) -> Result<Decimal, ValidationError> {
        self.0
            .get(currency)
            .copied()
            .ok_or_else(|| ValidationError::MissingMoneyLimit(currency.to_string()))
    }

    /// Check that `available` money covers `required`.
    pub fn ensure_funds(required: Decimal, available: Decimal) -> Result<(), ValidationError> {
        if available < required {
            return Err(ValidationError::InsufficientFunds {
                required,
                available,
            });
        }
        Ok(())
    }
}

impl From<HashMap<String, Decimal>> for MoneyLimits {
    fn from(limits: HashMap<String, Decimal>) -> Self {
        Self(limits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_limit_lookup() {
        let limits = MoneyLimits::from(HashMap::from([("rub".to_string(), dec!(5000))]));
        assert_eq!(limits.for_currency("rub").unwrap(), dec!(5000));
        assert_eq!(
            limits.for_currency("usd"),
            Err(ValidationError::MissingMoneyLimit("usd".into()))
        );
    }

    #[test]
    fn test_ensure_funds() {
        assert!(MoneyLimits::ensure_funds(dec!(100), dec!(100)).is_ok());
        assert!(matches!(
            MoneyLimits::ensure_funds(dec!(150), dec!(100)),
            Err(ValidationError::InsufficientFunds { .. })
        ));
    }
}
