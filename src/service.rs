//! Application service wiring repositories, the paper exchange, the algorithm
//! factory and the execution engine together.

use autotrade_backtest::{
    get_statistics, run_backtest, ActionStatistics, BacktestResult, InstrumentSpec, MarketData,
    RangeBacktestOrchestrator, RangeReport,
};
use autotrade_broker::{EngineSettings, OrderExecutionEngine, PaperExchange};
use autotrade_config::{AppConfig, RetrySettings};
use autotrade_core::error::{StrategyError, TradingError, TradingResult};
use autotrade_core::traits::{AlgoRepository, Algorithm, HistoryRepository};
use autotrade_core::types::{AlgorithmConfig, Candle, Environment, HistoryRecord};
use autotrade_core::CancelToken;
use autotrade_data::{
    InMemoryActionRepository, InMemoryAlgoRepository, InMemoryHistoryRepository, RetryPolicy,
};
use autotrade_monitor::AlgorithmStatus;
use autotrade_risk::MoneyLimits;
use autotrade_strategies::{AlgorithmFactory, StrategyRegistry};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// What a history import stored.
#[derive(Debug, Clone, PartialEq)]
pub struct HistorySummary {
    pub records: usize,
    pub instruments: BTreeSet<String>,
    pub first: Option<DateTime<Utc>>,
    pub last: Option<DateTime<Utc>>,
}

impl HistorySummary {
    fn of(records: &[HistoryRecord]) -> Self {
        Self {
            records: records.len(),
            instruments: records.iter().map(|r| r.instrument_id.clone()).collect(),
            first: records.iter().map(|r| r.time).min(),
            last: records.iter().map(|r| r.time).max(),
        }
    }
}

pub fn retry_policy(settings: &RetrySettings) -> RetryPolicy {
    RetryPolicy {
        count: settings.count,
        interval: Duration::from_secs(settings.interval_minutes * 60),
    }
}

/// Paper exchange seeded with the configured instruments and starting money.
pub fn paper_exchange(config: &AppConfig) -> PaperExchange {
    let exchange = PaperExchange::new(config.sandbox.account_id.clone())
        .with_commission(config.sandbox.commission);
    for instrument in &config.instruments {
        exchange.add_instrument(instrument.to_info());
    }
    for (currency, amount) in &config.sandbox.money {
        exchange.deposit(currency, *amount);
    }
    exchange
}

/// Lot and currency of every configured instrument.
pub fn instrument_specs(config: &AppConfig) -> HashMap<String, InstrumentSpec> {
    config
        .instruments
        .iter()
        .map(|i| {
            (
                i.id.clone(),
                InstrumentSpec::new(i.lot, i.currency.to_lowercase()),
            )
        })
        .collect()
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Entry point for every operation the CLI offers.
pub struct TradingService {
    config: AppConfig,
    history: Arc<InMemoryHistoryRepository>,
    actions: Arc<InMemoryActionRepository>,
    algos: Arc<InMemoryAlgoRepository>,
    paper: Arc<PaperExchange>,
    factory: AlgorithmFactory,
    engine: OrderExecutionEngine,
    runs: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl TradingService {
    pub fn new(config: AppConfig) -> Self {
        let history = Arc::new(InMemoryHistoryRepository::new());
        let actions = Arc::new(InMemoryActionRepository::new());
        let algos = Arc::new(InMemoryAlgoRepository::new());
        let paper = Arc::new(paper_exchange(&config));

        let factory = AlgorithmFactory::new(
            Arc::new(StrategyRegistry::new()),
            history.clone(),
            algos.clone(),
        )
        .with_sandbox_exchange(paper.clone())
        .with_retry(retry_policy(&config.retry));

        let clock_source = paper.clone();
        let engine = OrderExecutionEngine::new(
            paper.clone(),
            actions.clone(),
            EngineSettings {
                reconcile_interval: Duration::from_secs(config.engine.reconcile_interval_secs),
            },
        )
        .with_clock(move || clock_source.clock().unwrap_or_else(Utc::now));

        Self {
            config,
            history,
            actions,
            algos,
            paper,
            factory,
            engine,
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &OrderExecutionEngine {
        &self.engine
    }

    /// Start the execution engine tasks.
    pub fn start(&self, cancel: CancelToken) -> TradingResult<Vec<JoinHandle<()>>> {
        Ok(self.engine.start(cancel)?)
    }

    fn algorithm_config(&self, id: &str) -> TradingResult<AlgorithmConfig> {
        self.config
            .algorithm(id)
            .cloned()
            .ok_or_else(|| StrategyError::NotFound(id.to_string()).into())
    }

    /// Replace the stored history with the records of a CSV file.
    pub async fn load_history(
        &self,
        path: &str,
        instrument_id: Option<&str>,
    ) -> TradingResult<HistorySummary> {
        let records = autotrade_data::load_csv(path, instrument_id)?;
        let summary = HistorySummary::of(&records);
        self.history.clear_and_save_all(records).await?;
        info!(
            path = %path,
            records = summary.records,
            instruments = summary.instruments.len(),
            "History loaded"
        );
        Ok(summary)
    }

    async fn market_data(&self, config: &AlgorithmConfig) -> TradingResult<Arc<MarketData>> {
        let records = self
            .history
            .find_all_by_instruments(&config.instrument_ids)
            .await?;
        Ok(Arc::new(MarketData::new(
            &records,
            instrument_specs(&self.config),
            self.config.backtest.commission,
        )))
    }

    /// Backtest one configured algorithm over the stored history.
    pub async fn analyze(&self, algorithm_id: &str, cancel: CancelToken) -> TradingResult<BacktestResult> {
        let config = self.algorithm_config(algorithm_id)?;
        let market = self.market_data(&config).await?;
        let algorithm = self.factory.new_historical(config).await?;
        run_backtest(algorithm, market, cancel).await
    }

    /// Backtest every parameter set of a configured range algorithm.
    pub async fn analyze_range(
        &self,
        algorithm_id: &str,
        workers: Option<usize>,
        cancel: CancelToken,
    ) -> TradingResult<RangeReport> {
        let config = self.algorithm_config(algorithm_id)?;
        let market = self.market_data(&config).await?;
        let algorithms = self.factory.new_range(config).await?;
        let report = RangeBacktestOrchestrator::new(market, self.config.backtest.reference_currency.clone())
            .with_workers(workers.unwrap_or(self.config.backtest.workers))
            .run(algorithms, cancel)
            .await;
        Ok(report)
    }

    /// Start a configured algorithm in the sandbox environment.
    pub async fn start_trade(&self, algorithm_id: &str) -> TradingResult<Arc<dyn Algorithm>> {
        let mut config = self.algorithm_config(algorithm_id)?;
        if config.account_id.is_empty() {
            config.account_id = self.paper.account_id().to_string();
        }
        let money_limits = MoneyLimits::from(config.money_limits.clone());

        let algorithm = self.factory.new_sandbox(config.clone()).await?;
        let subscription = algorithm.subscribe()?;
        self.engine.add_subscription(subscription, money_limits)?;

        config.is_active = true;
        if let Err(e) = self.algos.save(&config).await {
            warn!(algorithm_id = %algorithm_id, error = %e, "Failed to persist algorithm");
        }

        let handle = match algorithm.go(CancelToken::new()) {
            Ok(handle) => handle,
            Err(e) => {
                self.engine.remove_subscription(algorithm_id);
                self.factory.remove(algorithm_id);
                return Err(e.into());
            }
        };
        lock(&self.runs).insert(algorithm_id.to_string(), handle);
        Ok(algorithm)
    }

    /// Stop a running algorithm and wait for it to persist its state.
    pub async fn stop_algorithm(&self, algorithm_id: &str) -> TradingResult<()> {
        let algorithm = self
            .factory
            .get_by_id(algorithm_id)
            .ok_or_else(|| StrategyError::NotFound(algorithm_id.to_string()))?;
        algorithm.stop();
        self.engine.remove_subscription(algorithm_id);

        let handle = lock(&self.runs).remove(algorithm_id);
        if let Some(handle) = handle {
            handle.await.map_err(|e| {
                TradingError::Internal(format!("algorithm {} panicked: {}", algorithm_id, e))
            })?;
        }
        self.factory.remove(algorithm_id);
        info!(algorithm_id = %algorithm_id, "Algorithm stopped by request");
        Ok(())
    }

    /// Stop every algorithm started through this service.
    pub async fn stop_all(&self) {
        let ids: Vec<String> = lock(&self.runs).keys().cloned().collect();
        let results = futures::future::join_all(ids.iter().map(|id| self.stop_algorithm(id))).await;
        for (id, result) in ids.iter().zip(results) {
            if let Err(e) = result {
                warn!(algorithm_id = %id, error = %e, "Failed to stop algorithm");
            }
        }
    }

    /// Status of running live and sandbox algorithms.
    pub fn list_active_algorithms(&self) -> Vec<AlgorithmStatus> {
        [Environment::Live, Environment::Sandbox]
            .into_iter()
            .flat_map(|env| self.factory.list_active(env))
            .map(|algorithm| AlgorithmStatus::of(algorithm.as_ref()))
            .collect()
    }

    pub async fn get_statistics(&self, algorithm_id: &str) -> TradingResult<ActionStatistics> {
        Ok(get_statistics(self.actions.as_ref(), algorithm_id, &instrument_specs(&self.config)).await?)
    }

    /// Feed candles to the paper exchange, reconciling after each one.
    pub async fn replay(&self, candles: Vec<Candle>, pace: Duration, cancel: &CancelToken) -> usize {
        let mut pushed = 0;
        for candle in candles {
            if cancel.is_cancelled() {
                break;
            }
            self.paper.push_candle(candle);
            pushed += 1;
            // Let the signal processors and the engine observe the candle
            if !cancel.sleep(pace).await {
                break;
            }
            self.engine.reconcile().await;
        }
        info!(candles = pushed, "Replay finished");
        pushed
    }
}
