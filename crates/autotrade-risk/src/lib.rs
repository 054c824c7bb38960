//! Risk management for trading.
//!
//! Provides the stop-loss trigger, the break-even sell gate, lot sizing with
//! price-increment normalisation, and per-currency money limits.

mod break_even;
mod money_limits;
mod position_sizer;
mod stop_loss;

pub use break_even::BreakEvenGate;
pub use money_limits::MoneyLimits;
pub use position_sizer::{normalize_price, order_cost, LotSizer};
pub use stop_loss::StopLossRule;
