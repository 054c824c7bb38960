//! Action requests and exchange order types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Market order - execute immediately at best available price
    Market,
    /// Limit order - execute at specified price or better
    Limit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

/// Lifecycle of an action request.
///
/// `Created → Posted → {Success, Failed, Canceled}`; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Created,
    Posted,
    Success,
    Failed,
    Canceled,
}

impl ActionStatus {
    /// Check if the action reached a final state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Success | ActionStatus::Failed | ActionStatus::Canceled
        )
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActionStatus::Created => "created",
            ActionStatus::Posted => "posted",
            ActionStatus::Success => "success",
            ActionStatus::Failed => "failed",
            ActionStatus::Canceled => "canceled",
        };
        write!(f, "{}", s)
    }
}

/// A trade decision travelling from an algorithm to an executor and back.
///
/// The algorithm fills the request part; the executor fills the execution part
/// (`order_id`, `position_price`, `lots_filled`, `commission`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub id: Uuid,
    pub algorithm_id: String,
    pub account_id: String,
    pub instrument_id: String,
    pub direction: Side,
    pub order_type: OrderType,
    /// Limit price, or the reference price for market orders
    pub requested_price: Option<Decimal>,
    /// Requested lots; buys leave it empty and are sized by the executor
    pub lot_amount: Option<i64>,
    /// Signal time the decision was taken at
    pub timestamp: DateTime<Utc>,
    /// Orders still open after this moment are cancelled
    pub expiration_time: DateTime<Utc>,
    pub status: ActionStatus,
    /// Failure reason or other human-readable note
    pub message: Option<String>,
    pub order_id: Option<String>,
    /// Executed price per instrument unit
    pub position_price: Option<Decimal>,
    pub lots_filled: i64,
    pub commission: Decimal,
}

impl ActionRequest {
    /// Create a new request in the `Created` state.
    pub fn new(
        algorithm_id: impl Into<String>,
        account_id: impl Into<String>,
        instrument_id: impl Into<String>,
        direction: Side,
        order_type: OrderType,
        timestamp: DateTime<Utc>,
        expiration_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            algorithm_id: algorithm_id.into(),
            account_id: account_id.into(),
            instrument_id: instrument_id.into(),
            direction,
            order_type,
            requested_price: None,
            lot_amount: None,
            timestamp,
            expiration_time,
            status: ActionStatus::Created,
            message: None,
            order_id: None,
            position_price: None,
            lots_filled: 0,
            commission: Decimal::ZERO,
        }
    }

    /// Set the requested price.
    pub fn with_price(mut self, price: Decimal) -> Self {
        self.requested_price = Some(price);
        self
    }

    /// Set the requested lot amount.
    pub fn with_lots(mut self, lots: i64) -> Self {
        self.lot_amount = Some(lots);
        self
    }

    /// Mark the request as posted under an exchange order id.
    pub fn mark_posted(&mut self, order_id: impl Into<String>) -> bool {
        if self.status != ActionStatus::Created {
            return false;
        }
        self.order_id = Some(order_id.into());
        self.status = ActionStatus::Posted;
        true
    }

    /// Record a (possibly partial) execution and finish successfully.
    pub fn succeed(&mut self, position_price: Decimal, lots_filled: i64, commission: Decimal) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.position_price = Some(position_price);
        self.lots_filled = lots_filled;
        self.commission = commission;
        self.status = ActionStatus::Success;
        true
    }

    /// Finish with a failure reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.message = Some(reason.into());
        self.status = ActionStatus::Failed;
        true
    }

    /// Finish as canceled.
    pub fn cancel(&mut self, reason: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.message = Some(reason.into());
        self.status = ActionStatus::Canceled;
        true
    }

    /// Check if the request has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration_time
    }
}

/// Order status as reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Rejected,
    Cancelled,
}

impl OrderStatus {
    /// Check if the order is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Rejected | OrderStatus::Cancelled
        )
    }

    /// Check if the order can still be filled.
    pub fn is_active(&self) -> bool {
        matches!(self, OrderStatus::New | OrderStatus::PartiallyFilled)
    }
}

/// Order submission sent to the exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub account_id: String,
    pub instrument_id: String,
    pub direction: Side,
    pub order_type: OrderType,
    pub lots: i64,
    /// Price per instrument unit (limit orders)
    pub price: Option<Decimal>,
    /// Idempotency key, the action id
    pub client_order_id: String,
}

/// Exchange-side view of an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderState {
    pub order_id: String,
    pub account_id: String,
    pub instrument_id: String,
    pub direction: Side,
    pub status: OrderStatus,
    pub lots_requested: i64,
    pub lots_executed: i64,
    /// Average executed price per instrument unit
    pub executed_price: Option<Decimal>,
    pub commission: Decimal,
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use rust_decimal_macros::dec;

    fn request() -> ActionRequest {
        let now = Utc::now();
        ActionRequest::new(
            "algo-1",
            "acc",
            "SBER",
            Side::Buy,
            OrderType::Limit,
            now,
            now + TimeDelta::seconds(60),
        )
        .with_price(dec!(250.5))
    }

    #[test]
    fn test_action_lifecycle() {
        let mut action = request();
        assert_eq!(action.status, ActionStatus::Created);

        assert!(action.mark_posted("order-1"));
        assert_eq!(action.status, ActionStatus::Posted);
        assert_eq!(action.order_id.as_deref(), Some("order-1"));

        assert!(action.succeed(dec!(250.4), 3, dec!(0.75)));
        assert_eq!(action.status, ActionStatus::Success);
        assert_eq!(action.lots_filled, 3);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut action = request();
        assert!(action.fail("zero quantity"));
        assert!(!action.succeed(dec!(1), 1, Decimal::ZERO));
        assert!(!action.cancel("late"));
        assert!(!action.mark_posted("order-2"));
        assert_eq!(action.status, ActionStatus::Failed);
        assert_eq!(action.message.as_deref(), Some("zero quantity"));
    }

    #[test]
    fn test_expiration() {
        let action = request();
        assert!(!action.is_expired(action.timestamp));
        assert!(action.is_expired(action.expiration_time + TimeDelta::seconds(1)));
    }

    #[test]
    fn test_order_status_classes() {
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(OrderStatus::PartiallyFilled.is_active());
        assert!(!OrderStatus::New.is_terminal());
    }
}
