//! Construction of algorithms bound to an environment.

use autotrade_core::error::{DataError, StrategyError};
use autotrade_core::traits::{AlgoRepository, Algorithm, Exchange, HistoryRepository, SignalProcessor};
use autotrade_core::types::{AlgorithmConfig, Environment, HistoryRecord, Parameters};
use autotrade_data::{HistoricalSignalProcessor, LiveSignalProcessor, RetryPolicy};
use chrono::TimeDelta;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::info;

use crate::algorithm::TradingAlgorithm;
use crate::registry::StrategyRegistry;
use crate::splitter::parse_and_split;
use crate::trend::keys;

const DEFAULT_ORDER_EXPIRATION_SECS: i64 = 300;

type Registry = RwLock<HashMap<String, Arc<dyn Algorithm>>>;

fn read(registry: &Registry) -> RwLockReadGuard<'_, HashMap<String, Arc<dyn Algorithm>>> {
    registry.read().unwrap_or_else(|e| e.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Id of an algorithm being built, released on drop.
struct Reservation<'a> {
    starting: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        lock(self.starting).remove(&self.id);
    }
}

fn write(registry: &Registry) -> RwLockWriteGuard<'_, HashMap<String, Arc<dyn Algorithm>>> {
    registry.write().unwrap_or_else(|e| e.into_inner())
}

/// Window and expiration settings shared by every strategy.
#[derive(Debug, Clone, Copy)]
struct RunSettings {
    short_minutes: i64,
    long_minutes: i64,
    order_expiration: TimeDelta,
}

impl RunSettings {
    fn from_parameters(params: &Parameters) -> Result<Self, StrategyError> {
        Ok(Self {
            short_minutes: params.require(keys::SHORT_DURATION)?,
            long_minutes: params.require(keys::LONG_DURATION)?,
            order_expiration: TimeDelta::seconds(
                params.parse_or(keys::ORDER_EXPIRATION_SECS, DEFAULT_ORDER_EXPIRATION_SECS)?,
            ),
        })
    }
}

/// Builds algorithms and keeps the registries of running live and sandbox ones.
pub struct AlgorithmFactory {
    strategies: Arc<StrategyRegistry>,
    live_exchange: Option<Arc<dyn Exchange>>,
    sandbox_exchange: Option<Arc<dyn Exchange>>,
    history: Arc<dyn HistoryRepository>,
    algo_repo: Arc<dyn AlgoRepository>,
    retry: RetryPolicy,
    live: Registry,
    sandbox: Registry,
    /// Ids whose streaming build is in progress
    starting: Mutex<HashSet<String>>,
}

impl AlgorithmFactory {
    pub fn new(
        strategies: Arc<StrategyRegistry>,
        history: Arc<dyn HistoryRepository>,
        algo_repo: Arc<dyn AlgoRepository>,
    ) -> Self {
        Self {
            strategies,
            live_exchange: None,
            sandbox_exchange: None,
            history,
            algo_repo,
            retry: RetryPolicy::default(),
            live: RwLock::new(HashMap::new()),
            sandbox: RwLock::new(HashMap::new()),
            starting: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_live_exchange(mut self, exchange: Arc<dyn Exchange>) -> Self {
        self.live_exchange = Some(exchange);
        self
    }

    pub fn with_sandbox_exchange(mut self, exchange: Arc<dyn Exchange>) -> Self {
        self.sandbox_exchange = Some(exchange);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Build a live algorithm and register it.
    pub async fn new_live(&self, config: AlgorithmConfig) -> Result<Arc<dyn Algorithm>, StrategyError> {
        self.new_streaming(Environment::Live, config).await
    }

    /// Build a sandbox algorithm and register it.
    pub async fn new_sandbox(&self, config: AlgorithmConfig) -> Result<Arc<dyn Algorithm>, StrategyError> {
        self.new_streaming(Environment::Sandbox, config).await
    }

    async fn new_streaming(
        &self,
        environment: Environment,
        config: AlgorithmConfig,
    ) -> Result<Arc<dyn Algorithm>, StrategyError> {
        let (exchange, registry) = match environment {
            Environment::Live => (&self.live_exchange, &self.live),
            Environment::Sandbox => (&self.sandbox_exchange, &self.sandbox),
            Environment::Historical => return self.new_historical(config).await,
        };
        let exchange = exchange
            .clone()
            .ok_or(StrategyError::EnvironmentUnavailable(environment))?;
        validate(&config)?;
        let reservation = self.reserve(registry, &config.id)?;

        let strategy = self.strategies.create(environment, &config)?;
        let settings = RunSettings::from_parameters(&config.parameters)?;
        let processor = LiveSignalProcessor::connect(
            exchange,
            config.instrument_ids.clone(),
            settings.short_minutes,
            settings.long_minutes,
            self.retry,
        )
        .await?;

        let algorithm: Arc<dyn Algorithm> = Arc::new(TradingAlgorithm::new(
            config,
            environment,
            strategy,
            Box::new(processor),
            settings.order_expiration,
            Some(self.algo_repo.clone()),
        ));
        info!(
            algorithm_id = %algorithm.id(),
            environment = %environment,
            "Algorithm created"
        );
        let mut registered = write(registry);
        drop(reservation);
        registered.insert(algorithm.id().to_string(), algorithm.clone());
        Ok(algorithm)
    }

    /// Claim `id` until the returned reservation is dropped.
    ///
    /// Fails while the id is registered or another build holds it.
    fn reserve<'a>(&'a self, registry: &Registry, id: &str) -> Result<Reservation<'a>, StrategyError> {
        let registered = read(registry);
        let mut starting = lock(&self.starting);
        if registered.contains_key(id) || !starting.insert(id.to_string()) {
            return Err(StrategyError::AlreadyStarted(id.to_string()));
        }
        Ok(Reservation {
            starting: &self.starting,
            id: id.to_string(),
        })
    }

    /// Build a backtest algorithm over the stored history of its instruments.
    pub async fn new_historical(
        &self,
        config: AlgorithmConfig,
    ) -> Result<Arc<dyn Algorithm>, StrategyError> {
        let history = self.load_history(&config).await?;
        self.historical_with(config, history)
    }

    /// Build a backtest algorithm over already loaded history.
    pub fn historical_with(
        &self,
        config: AlgorithmConfig,
        history: Arc<Vec<HistoryRecord>>,
    ) -> Result<Arc<dyn Algorithm>, StrategyError> {
        validate(&config)?;
        let strategy = self.strategies.create(Environment::Historical, &config)?;
        let settings = RunSettings::from_parameters(&config.parameters)?;
        let processor: Box<dyn SignalProcessor> = Box::new(HistoricalSignalProcessor::new(
            history,
            &config.instrument_ids,
            settings.short_minutes,
            settings.long_minutes,
        ));

        Ok(Arc::new(TradingAlgorithm::new(
            config,
            Environment::Historical,
            strategy,
            processor,
            settings.order_expiration,
            None,
        )))
    }

    /// Build one backtest algorithm per parameter set of a range configuration.
    ///
    /// Ids are `<id>#<n>`; all instances share one copy of the history.
    pub async fn new_range(
        &self,
        config: AlgorithmConfig,
    ) -> Result<Vec<Arc<dyn Algorithm>>, StrategyError> {
        let sets = parse_and_split(&config.parameters)?;
        let history = self.load_history(&config).await?;

        let algorithms = sets
            .into_iter()
            .enumerate()
            .map(|(n, parameters)| {
                let mut instance = config.clone();
                instance.id = format!("{}#{}", config.id, n);
                instance.parameters = parameters;
                self.historical_with(instance, history.clone())
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            algorithm_id = %config.id,
            instances = algorithms.len(),
            records = history.len(),
            "Range backtest prepared"
        );
        Ok(algorithms)
    }

    async fn load_history(&self, config: &AlgorithmConfig) -> Result<Arc<Vec<HistoryRecord>>, StrategyError> {
        let history = self
            .history
            .find_all_by_instruments(&config.instrument_ids)
            .await?;
        if history.is_empty() {
            return Err(DataError::NoDataAvailable.into());
        }
        Ok(history)
    }

    /// Find a live or sandbox algorithm.
    pub fn get_by_id(&self, id: &str) -> Option<Arc<dyn Algorithm>> {
        let live = read(&self.live).get(id).cloned();
        live.or_else(|| read(&self.sandbox).get(id).cloned())
    }

    /// Running algorithms of one environment.
    pub fn list_active(&self, environment: Environment) -> Vec<Arc<dyn Algorithm>> {
        let registry = match environment {
            Environment::Live => &self.live,
            Environment::Sandbox => &self.sandbox,
            Environment::Historical => return Vec::new(),
        };
        let mut active: Vec<_> = read(registry)
            .values()
            .filter(|a| a.is_running())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.id().cmp(b.id()));
        active
    }

    /// Drop an algorithm from the registries so its id can be reused.
    pub fn remove(&self, id: &str) -> Option<Arc<dyn Algorithm>> {
        write(&self.live)
            .remove(id)
            .or_else(|| write(&self.sandbox).remove(id))
    }
}

fn validate(config: &AlgorithmConfig) -> Result<(), StrategyError> {
    if config.id.is_empty() {
        return Err(StrategyError::InvalidConfig("Algorithm id is empty".into()));
    }
    if config.instrument_ids.is_empty() {
        return Err(StrategyError::InvalidConfig(
            "At least one instrument required".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trend::{TrendCrossoverConfig, STRATEGY_NAME};
    use autotrade_broker::PaperExchange;
    use autotrade_core::types::{HistoryRecord, InstrumentInfo};
    use autotrade_data::{InMemoryAlgoRepository, InMemoryHistoryRepository};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn config(id: &str) -> AlgorithmConfig {
        let mut config = AlgorithmConfig::new(id, STRATEGY_NAME);
        config.account_id = "acc".into();
        config.instrument_ids = vec!["SBER".into()];
        config.parameters = TrendCrossoverConfig::default_parameters();
        config
    }

    async fn factory_with_history(records: Vec<HistoryRecord>) -> AlgorithmFactory {
        let history = Arc::new(InMemoryHistoryRepository::new());
        history.clear_and_save_all(records).await.unwrap();
        AlgorithmFactory::new(
            Arc::new(StrategyRegistry::new()),
            history,
            Arc::new(InMemoryAlgoRepository::new()),
        )
    }

    fn records() -> Vec<HistoryRecord> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        (0..10)
            .map(|m| HistoryRecord::new("SBER", start + TimeDelta::minutes(m), 100.0 + m as f64))
            .collect()
    }

    #[tokio::test]
    async fn test_streaming_needs_exchange() {
        let factory = factory_with_history(records()).await;
        let err = factory.new_live(config("live-1")).await.err().unwrap();
        assert!(matches!(
            err,
            StrategyError::EnvironmentUnavailable(Environment::Live)
        ));
        let err = factory.new_sandbox(config("sb-1")).await.err().unwrap();
        assert!(matches!(
            err,
            StrategyError::EnvironmentUnavailable(Environment::Sandbox)
        ));
    }

    #[tokio::test]
    async fn test_historical_requires_history() {
        let factory = factory_with_history(Vec::new()).await;
        let err = factory.new_historical(config("bt")).await.err().unwrap();
        assert!(matches!(err, StrategyError::Data(DataError::NoDataAvailable)));
    }

    #[tokio::test]
    async fn test_historical_is_not_registered() {
        let factory = factory_with_history(records()).await;
        let algorithm = factory.new_historical(config("bt")).await.unwrap();

        assert_eq!(algorithm.environment(), Environment::Historical);
        assert_eq!(algorithm.strategy_name(), STRATEGY_NAME);
        assert!(factory.get_by_id("bt").is_none());
        assert!(factory.list_active(Environment::Historical).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_strategy_and_bad_config() {
        let factory = factory_with_history(records()).await;

        let mut unknown = config("x");
        unknown.strategy_name = "mean_reversion".into();
        assert!(matches!(
            factory.new_historical(unknown).await.err().unwrap(),
            StrategyError::UnsupportedStrategy(_)
        ));

        let mut empty = config("y");
        empty.instrument_ids.clear();
        assert!(matches!(
            factory.historical_with(empty, Arc::new(records())).err().unwrap(),
            StrategyError::InvalidConfig(_)
        ));
    }

    #[tokio::test]
    async fn test_range_builds_one_instance_per_set() {
        let factory = factory_with_history(records()).await;
        let mut range = config("grid");
        range.parameters.set(keys::SHORT_DURATION, "1:1:3");
        range.parameters.set(keys::LONG_DURATION, "5:5:10");

        let algorithms = factory.new_range(range).await.unwrap();
        let ids: Vec<_> = algorithms.iter().map(|a| a.id().to_string()).collect();
        assert_eq!(ids.len(), 6);
        assert_eq!(ids[0], "grid#0");
        assert_eq!(ids[5], "grid#5");

        let mut params: Vec<(i64, i64)> = algorithms
            .iter()
            .map(|a| {
                let p = a.config().parameters;
                (
                    p.require(keys::SHORT_DURATION).unwrap(),
                    p.require(keys::LONG_DURATION).unwrap(),
                )
            })
            .collect();
        params.sort();
        params.dedup();
        assert_eq!(params.len(), 6);
    }

    #[tokio::test]
    async fn test_concurrent_builds_of_one_id_register_one_algorithm() {
        let exchange = Arc::new(PaperExchange::new("acc"));
        exchange.add_instrument(InstrumentInfo::tradable("SBER", "rub", 1, dec!(0.01)));
        let factory = factory_with_history(records())
            .await
            .with_sandbox_exchange(exchange);

        let (a, b) = tokio::join!(
            factory.new_sandbox(config("sb")),
            factory.new_sandbox(config("sb"))
        );
        let built: Vec<_> = [a, b].into_iter().filter_map(Result::ok).collect();
        assert_eq!(built.len(), 1);
        let registered = factory.get_by_id("sb").unwrap();
        assert!(Arc::ptr_eq(&registered, &built[0]));

        assert!(matches!(
            factory.new_sandbox(config("sb")).await,
            Err(StrategyError::AlreadyStarted(_))
        ));
        factory.remove("sb");
        assert!(factory.new_sandbox(config("sb")).await.is_ok());
    }
}
