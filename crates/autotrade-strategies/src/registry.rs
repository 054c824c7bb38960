//! Strategy registry mapping names to per-environment constructors.

use autotrade_core::error::StrategyError;
use autotrade_core::traits::Strategy;
use autotrade_core::types::{AlgorithmConfig, AlgorithmContext, Environment, Parameters};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::trend::{TrendCrossoverConfig, TrendCrossoverStrategy, STRATEGY_NAME};

/// Builds a strategy from an algorithm configuration.
pub type StrategyConstructor = fn(&AlgorithmConfig) -> Result<Box<dyn Strategy>, StrategyError>;

/// Constructors of one strategy, one per environment.
#[derive(Clone, Copy)]
pub struct StrategyConstructors {
    pub live: StrategyConstructor,
    pub sandbox: StrategyConstructor,
    pub historical: StrategyConstructor,
}

impl StrategyConstructors {
    pub fn for_environment(&self, environment: Environment) -> StrategyConstructor {
        match environment {
            Environment::Live => self.live,
            Environment::Sandbox => self.sandbox,
            Environment::Historical => self.historical,
        }
    }
}

/// Information about a registered strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyInfo {
    /// Registry key
    pub name: String,
    /// Strategy description
    pub description: String,
    /// Parameters a new algorithm starts from
    pub default_parameters: Parameters,
}

struct Entry {
    info: StrategyInfo,
    constructors: StrategyConstructors,
}

/// Registry for available trading strategies.
pub struct StrategyRegistry {
    strategies: HashMap<String, Entry>,
}

fn trend_resuming(config: &AlgorithmConfig) -> Result<Box<dyn Strategy>, StrategyError> {
    Ok(Box::new(TrendCrossoverStrategy::from_config(config)?))
}

/// Backtests always start flat, whatever context the source algorithm carries.
fn trend_flat(config: &AlgorithmConfig) -> Result<Box<dyn Strategy>, StrategyError> {
    let params = TrendCrossoverConfig::from_parameters(&config.parameters)?;
    Ok(Box::new(TrendCrossoverStrategy::new(
        params,
        &AlgorithmContext::default(),
    )))
}

impl StrategyRegistry {
    /// Create a registry with all built-in strategies.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(
            StrategyInfo {
                name: STRATEGY_NAME.to_string(),
                description: "Trades crossovers of short and long time-weighted averages".to_string(),
                default_parameters: TrendCrossoverConfig::default_parameters(),
            },
            StrategyConstructors {
                live: trend_resuming,
                sandbox: trend_resuming,
                historical: trend_flat,
            },
        );
        registry
    }

    /// Create a registry without any strategy.
    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Register a strategy, replacing any previous one with the same name.
    pub fn register(&mut self, info: StrategyInfo, constructors: StrategyConstructors) {
        self.strategies
            .insert(info.name.clone(), Entry { info, constructors });
    }

    /// List all available strategies, ordered by name.
    pub fn list(&self) -> Vec<&StrategyInfo> {
        let mut infos: Vec<_> = self.strategies.values().map(|e| &e.info).collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Get strategy info by name.
    pub fn get(&self, name: &str) -> Option<&StrategyInfo> {
        self.strategies.get(name).map(|e| &e.info)
    }

    /// Check if a strategy exists.
    pub fn exists(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }

    /// Create the strategy of `config` for `environment`.
    pub fn create(
        &self,
        environment: Environment,
        config: &AlgorithmConfig,
    ) -> Result<Box<dyn Strategy>, StrategyError> {
        let entry = self
            .strategies
            .get(&config.strategy_name)
            .ok_or_else(|| StrategyError::UnsupportedStrategy(config.strategy_name.clone()))?;
        (entry.constructors.for_environment(environment))(config)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
