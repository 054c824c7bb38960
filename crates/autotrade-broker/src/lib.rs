//! Order execution.
//!
//! [`OrderExecutionEngine`] multiplexes the requests of many algorithms into
//! one pipeline against an [`Exchange`](autotrade_core::traits::Exchange);
//! [`PaperExchange`] is an in-memory venue used by the sandbox.

mod engine;
mod paper;

pub use engine::{EngineSettings, OrderExecutionEngine, DEFAULT_RECONCILE_INTERVAL};
pub use paper::PaperExchange;
