//! Trading algorithms.
//!
//! - [`TradingAlgorithm`]: runtime binding a strategy to a signal processor
//!   and an executor's action channel
//! - [`TrendCrossoverStrategy`]: short/long weighted average crossover
//! - [`StrategyRegistry`] and [`AlgorithmFactory`]: construction by name and
//!   environment, plus the registries of running algorithms

mod algorithm;
mod factory;
mod registry;
mod splitter;
pub mod trend;

pub use algorithm::TradingAlgorithm;
pub use factory::AlgorithmFactory;
pub use registry::{StrategyConstructor, StrategyConstructors, StrategyInfo, StrategyRegistry};
pub use splitter::{parse_and_split, parse_range};
pub use trend::{keys, TrendCrossoverConfig, TrendCrossoverStrategy, STRATEGY_NAME};
