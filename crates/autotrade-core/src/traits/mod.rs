//! Core traits for the trading engine.

mod exchange;
mod repository;
mod signal;
mod strategy;

pub use exchange::{CandleFeed, Exchange};
pub use repository::{ActionRepository, AlgoRepository, HistoryRepository};
pub use signal::SignalProcessor;
pub use strategy::{Algorithm, Strategy};
