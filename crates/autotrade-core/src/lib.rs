//! Core types and traits for the trading engine.
//!
//! This crate provides the foundational building blocks including:
//! - Market data types (Candle, HistoryRecord, SignalFrame)
//! - Action requests, exchange order states and subscriptions
//! - Algorithm configuration and its persisted context
//! - Core traits for exchanges, signal processors, algorithms and repositories

pub mod cancel;
pub mod error;
pub mod traits;
pub mod types;

pub use cancel::CancelToken;
pub use error::{TradingError, TradingResult};
pub use traits::*;
pub use types::*;
