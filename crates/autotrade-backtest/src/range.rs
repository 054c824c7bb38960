//! Single and parameter-sweep backtest runs.

use autotrade_core::error::{TradingError, TradingResult};
use autotrade_core::traits::Algorithm;
use autotrade_core::CancelToken;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::report::RangeReport;
use crate::simulator::{BacktestResult, BacktestSimulator, MarketData};

/// Default number of simulators running at once.
pub const DEFAULT_WORKERS: usize = 18;

/// Run one historical algorithm to completion under its own simulator.
pub async fn run_backtest(
    algorithm: Arc<dyn Algorithm>,
    market: Arc<MarketData>,
    cancel: CancelToken,
) -> TradingResult<BacktestResult> {
    let subscription = algorithm.subscribe()?;
    let simulator = BacktestSimulator::new(&algorithm.config(), market);
    let (results_tx, mut results_rx) = mpsc::channel(1);
    tokio::spawn(simulator.run(subscription, results_tx));

    let handle = algorithm.go(cancel)?;
    handle
        .await
        .map_err(|e| TradingError::Internal(format!("algorithm {} panicked: {}", algorithm.id(), e)))?;

    results_rx
        .recv()
        .await
        .ok_or_else(|| TradingError::Internal(format!("no result for {}", algorithm.id())))
}

/// Runs many backtests over shared market data on a bounded pool.
pub struct RangeBacktestOrchestrator {
    workers: usize,
    reference_currency: String,
    market: Arc<MarketData>,
}

impl RangeBacktestOrchestrator {
    pub fn new(market: Arc<MarketData>, reference_currency: impl Into<String>) -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            reference_currency: reference_currency.into(),
            market,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run every algorithm and pick the best by final reference balance.
    ///
    /// Cancellation stops dispatching; runs already started finish and are
    /// reported.
    pub async fn run(&self, algorithms: Vec<Arc<dyn Algorithm>>, cancel: CancelToken) -> RangeReport {
        let started = Instant::now();
        let total = algorithms.len();
        let semaphore = Arc::new(Semaphore::new(self.workers));
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (results_tx, mut results_rx) = mpsc::channel::<(String, TradingResult<BacktestResult>)>(self.workers);

        info!(
            instances = total,
            workers = self.workers,
            "Starting range backtest"
        );

        let mut dispatched = 0;
        for algorithm in algorithms {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            dispatched += 1;

            let tx = results_tx.clone();
            let market = self.market.clone();
            let running = running.clone();
            let peak = peak.clone();
            tokio::spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);

                let id = algorithm.id().to_string();
                debug!(algorithm_id = %id, "Backtest worker started");
                let result = run_backtest(algorithm, market, CancelToken::new()).await;

                running.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
                let _ = tx.send((id, result)).await;
            });
        }
        // Workers hold the remaining senders; the channel closes with the last one
        drop(results_tx);

        let mut report = RangeReport::new(self.reference_currency.clone(), self.workers);
        while let Some((id, result)) = results_rx.recv().await {
            match result {
                Ok(result) => report.push(result),
                Err(e) => {
                    warn!(algorithm_id = %id, error = %e, "Backtest failed");
                    report.push_error(id, e.to_string());
                }
            }
        }

        report.total = total;
        report.skipped = total - dispatched;
        report.peak_concurrency = peak.load(Ordering::SeqCst);
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report.finalize();

        info!(
            completed = report.results.len(),
            failed = report.errors.len(),
            skipped = report.skipped,
            peak_concurrency = report.peak_concurrency,
            best = ?report.best().map(|b| b.algorithm_id.as_str()),
            "Range backtest finished"
        );
        report
    }
}
