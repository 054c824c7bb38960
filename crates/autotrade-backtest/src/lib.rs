//! Backtesting.
//!
//! - [`BacktestSimulator`]: fills action requests against historical prices
//! - [`RangeBacktestOrchestrator`]: runs parameter sweeps on a bounded worker pool
//! - [`get_statistics`]: action statistics of one algorithm

mod range;
mod report;
mod simulator;
mod statistics;

pub use range::{run_backtest, RangeBacktestOrchestrator, DEFAULT_WORKERS};
pub use report::RangeReport;
pub use simulator::{BacktestResult, BacktestSimulator, InstrumentSpec, MarketData, PriceSeries};
pub use statistics::{get_statistics, ActionStatistics, CurrencyVolume};
