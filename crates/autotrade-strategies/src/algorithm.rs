//! Algorithm runtime: binds a strategy to a signal processor and an executor.

use autotrade_core::cancel::CancelToken;
use autotrade_core::error::StrategyError;
use autotrade_core::traits::{AlgoRepository, Algorithm, SignalProcessor, Strategy};
use autotrade_core::types::{
    ActionRequest, AlgorithmChannels, AlgorithmConfig, Environment, SignalFrame, Subscription,
    TradeIntent,
};
use chrono::TimeDelta;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// A strategy running against one signal processor.
///
/// Lifecycle: construct, [`subscribe`](Algorithm::subscribe) to hand the
/// channel pair to an executor, then [`go`](Algorithm::go).
pub struct TradingAlgorithm {
    id: String,
    strategy_name: String,
    environment: Environment,
    order_expiration: TimeDelta,
    config: Arc<Mutex<AlgorithmConfig>>,
    repo: Option<Arc<dyn AlgoRepository>>,
    strategy: Mutex<Option<Box<dyn Strategy>>>,
    processor: Mutex<Option<Box<dyn SignalProcessor>>>,
    channels: Mutex<Option<AlgorithmChannels>>,
    subscribed: AtomicBool,
    cancel: Mutex<Option<CancelToken>>,
    running: Arc<AtomicBool>,
}

impl TradingAlgorithm {
    pub fn new(
        config: AlgorithmConfig,
        environment: Environment,
        strategy: Box<dyn Strategy>,
        processor: Box<dyn SignalProcessor>,
        order_expiration: TimeDelta,
        repo: Option<Arc<dyn AlgoRepository>>,
    ) -> Self {
        Self {
            id: config.id.clone(),
            strategy_name: config.strategy_name.clone(),
            environment,
            order_expiration,
            config: Arc::new(Mutex::new(config)),
            repo,
            strategy: Mutex::new(Some(strategy)),
            processor: Mutex::new(Some(processor)),
            channels: Mutex::new(None),
            subscribed: AtomicBool::new(false),
            cancel: Mutex::new(None),
            running: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl Algorithm for TradingAlgorithm {
    fn id(&self) -> &str {
        &self.id
    }

    fn strategy_name(&self) -> &str {
        &self.strategy_name
    }

    fn environment(&self) -> Environment {
        self.environment
    }

    fn config(&self) -> AlgorithmConfig {
        lock(&self.config).clone()
    }

    fn subscribe(&self) -> Result<Subscription, StrategyError> {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(StrategyError::DoubleSubscription(self.id.clone()));
        }
        let (subscription, channels) = Subscription::pair(self.id.clone());
        *lock(&self.channels) = Some(channels);
        Ok(subscription)
    }

    fn go(&self, cancel: CancelToken) -> Result<JoinHandle<()>, StrategyError> {
        let (mut processor, strategy, channels) = {
            let mut processor = lock(&self.processor);
            let mut strategy = lock(&self.strategy);
            if processor.is_none() || strategy.is_none() {
                return Err(StrategyError::AlreadyStarted(self.id.clone()));
            }
            let channels = lock(&self.channels)
                .take()
                .ok_or_else(|| StrategyError::NotSubscribed(self.id.clone()))?;
            match (processor.take(), strategy.take()) {
                (Some(p), Some(s)) => (p, s, channels),
                _ => return Err(StrategyError::AlreadyStarted(self.id.clone())),
            }
        };
        let frames = processor.stream()?;

        *lock(&self.cancel) = Some(cancel.clone());
        self.running.store(true, Ordering::SeqCst);
        lock(&self.config).is_active = true;

        let processor_cancel = cancel.clone();
        let algorithm_id = self.id.clone();
        let processor_name = processor.name().to_string();
        tokio::spawn(async move {
            if let Err(e) = processor.run(processor_cancel.clone()).await {
                error!(
                    algorithm_id = %algorithm_id,
                    processor = %processor_name,
                    error = %e,
                    "Signal processor failed"
                );
                processor_cancel.cancel();
            }
        });

        let account_id = lock(&self.config).account_id.clone();
        let run = AlgorithmLoop {
            algorithm_id: self.id.clone(),
            account_id,
            order_expiration: self.order_expiration,
            strategy,
            frames,
            requests: channels.requests,
            outcomes: channels.outcomes,
            cancel,
            config: self.config.clone(),
            repo: self.repo.clone(),
            running: self.running.clone(),
        };
        info!(
            algorithm_id = %self.id,
            strategy = %self.strategy_name,
            environment = %self.environment,
            "Algorithm started"
        );
        Ok(tokio::spawn(run.run()))
    }

    fn stop(&self) {
        if let Some(cancel) = lock(&self.cancel).as_ref() {
            cancel.cancel();
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// State owned by the processing task.
struct AlgorithmLoop {
    algorithm_id: String,
    account_id: String,
    order_expiration: TimeDelta,
    strategy: Box<dyn Strategy>,
    frames: mpsc::Receiver<SignalFrame>,
    requests: mpsc::Sender<ActionRequest>,
    outcomes: mpsc::UnboundedReceiver<ActionRequest>,
    cancel: CancelToken,
    config: Arc<Mutex<AlgorithmConfig>>,
    repo: Option<Arc<dyn AlgoRepository>>,
    running: Arc<AtomicBool>,
}

impl AlgorithmLoop {
    async fn run(mut self) {
        let mut frames_done = false;
        loop {
            if frames_done && !self.strategy.awaiting_outcome() {
                break;
            }
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(algorithm_id = %self.algorithm_id, "Algorithm cancelled");
                    break;
                }
                outcome = self.outcomes.recv() => match outcome {
                    Some(outcome) => self.on_outcome(outcome).await,
                    None => {
                        info!(algorithm_id = %self.algorithm_id, "Executor closed the subscription");
                        break;
                    }
                },
                frame = self.frames.recv(), if !frames_done => match frame {
                    Some(frame) => {
                        if !self.on_frame(frame).await {
                            break;
                        }
                    }
                    None => {
                        debug!(algorithm_id = %self.algorithm_id, "Signal stream ended");
                        frames_done = true;
                    }
                },
            }
        }
        self.shutdown().await;
    }

    /// Returns `false` when the loop must stop.
    async fn on_frame(&mut self, frame: SignalFrame) -> bool {
        let Some(intent) = self.strategy.on_frame(&frame) else {
            return true;
        };
        let action = self.to_action(intent, &frame);
        info!(
            algorithm_id = %self.algorithm_id,
            instrument_id = %action.instrument_id,
            action_id = %action.id,
            direction = %action.direction,
            order_type = %action.order_type,
            price = ?action.requested_price,
            "Requesting action"
        );

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.requests.send(action) => {
                if sent.is_err() {
                    warn!(algorithm_id = %self.algorithm_id, "Executor dropped the request channel");
                    return false;
                }
                true
            }
        }
    }

    fn to_action(&self, intent: TradeIntent, frame: &SignalFrame) -> ActionRequest {
        let action = ActionRequest::new(
            self.algorithm_id.clone(),
            self.account_id.clone(),
            intent.instrument_id,
            intent.direction,
            intent.order_type,
            frame.timestamp,
            frame.timestamp + self.order_expiration,
        )
        .with_price(intent.price);
        match intent.lots {
            Some(lots) => action.with_lots(lots),
            None => action,
        }
    }

    async fn on_outcome(&mut self, outcome: ActionRequest) {
        info!(
            algorithm_id = %self.algorithm_id,
            instrument_id = %outcome.instrument_id,
            action_id = %outcome.id,
            status = %outcome.status,
            lots = outcome.lots_filled,
            message = ?outcome.message,
            "Action outcome"
        );
        self.strategy.on_outcome(&outcome);
        self.persist_context().await;
    }

    /// Write the strategy context into the shared config and return a copy.
    fn encode_context(&self) -> Option<AlgorithmConfig> {
        let mut config = lock(&self.config);
        if let Err(e) = self
            .strategy
            .context()
            .encode_into(&mut config.context_parameters)
        {
            warn!(algorithm_id = %self.algorithm_id, error = %e, "Failed to encode context");
            return None;
        }
        Some(config.clone())
    }

    async fn persist_context(&mut self) {
        let Some(snapshot) = self.encode_context() else {
            return;
        };
        let Some(repo) = self.repo.clone() else {
            return;
        };
        if let Err(e) = repo.save(&snapshot).await {
            warn!(algorithm_id = %self.algorithm_id, error = %e, "Failed to persist context");
        }
    }

    async fn shutdown(self) {
        let AlgorithmLoop {
            algorithm_id,
            strategy,
            requests,
            cancel,
            config,
            repo,
            running,
            ..
        } = self;
        drop(requests);
        cancel.cancel();

        let snapshot = {
            let mut config = lock(&config);
            if let Err(e) = strategy.context().encode_into(&mut config.context_parameters) {
                warn!(algorithm_id = %algorithm_id, error = %e, "Failed to encode context");
            }
            config.is_active = false;
            config.clone()
        };
        if let Some(repo) = &repo {
            if let Err(e) = repo.save(&snapshot).await {
                warn!(algorithm_id = %algorithm_id, error = %e, "Failed to persist context");
            }
            if let Err(e) = repo.set_active_status(&algorithm_id, false).await {
                warn!(algorithm_id = %algorithm_id, error = %e, "Failed to mark algorithm inactive");
            }
        }

        running.store(false, Ordering::SeqCst);
        info!(algorithm_id = %algorithm_id, "Algorithm stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trend::{TrendCrossoverConfig, TrendCrossoverStrategy};
    use async_trait::async_trait;
    use autotrade_core::error::DataError;
    use autotrade_core::types::{ActionStatus, AlgorithmContext, Side};
    use autotrade_data::InMemoryAlgoRepository;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    /// Processor emitting a fixed list of frames.
    struct ScriptedProcessor {
        frames: Vec<SignalFrame>,
        tx: mpsc::Sender<SignalFrame>,
        rx: Option<mpsc::Receiver<SignalFrame>>,
    }

    impl ScriptedProcessor {
        fn boxed(frames: Vec<SignalFrame>) -> Box<dyn SignalProcessor> {
            let (tx, rx) = mpsc::channel(16);
            Box::new(Self {
                frames,
                tx,
                rx: Some(rx),
            })
        }
    }

    #[async_trait]
    impl SignalProcessor for ScriptedProcessor {
        fn stream(&mut self) -> Result<mpsc::Receiver<SignalFrame>, DataError> {
            self.rx.take().ok_or(DataError::StreamTaken)
        }

        async fn run(self: Box<Self>, cancel: CancelToken) -> Result<(), DataError> {
            for frame in self.frames {
                if cancel.is_cancelled() || self.tx.send(frame).await.is_err() {
                    break;
                }
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn frame(short: f64, long: f64, derivative: f64, price: f64) -> SignalFrame {
        SignalFrame {
            instrument_id: "SBER".into(),
            timestamp: Utc::now(),
            short_average: short,
            long_average: long,
            derivative,
            price,
        }
    }

    fn algorithm(
        frames: Vec<SignalFrame>,
        repo: Option<Arc<dyn AlgoRepository>>,
    ) -> TradingAlgorithm {
        let mut config = AlgorithmConfig::new("algo-1", "trend_crossover");
        config.account_id = "acc".into();
        config.instrument_ids = vec!["SBER".into()];
        let strategy = TrendCrossoverStrategy::new(
            TrendCrossoverConfig {
                short_minutes: 1,
                long_minutes: 5,
                ..Default::default()
            },
            &AlgorithmContext::default(),
        );
        TradingAlgorithm::new(
            config,
            Environment::Historical,
            Box::new(strategy),
            ScriptedProcessor::boxed(frames),
            TimeDelta::seconds(300),
            repo,
        )
    }

    #[tokio::test]
    async fn test_second_subscribe_fails() {
        let algo = algorithm(vec![], None);
        assert!(algo.subscribe().is_ok());
        assert!(matches!(
            algo.subscribe(),
            Err(StrategyError::DoubleSubscription(_))
        ));
    }

    #[tokio::test]
    async fn test_go_requires_subscription_and_runs_once() {
        let algo = algorithm(vec![], None);
        assert!(matches!(
            algo.go(CancelToken::new()),
            Err(StrategyError::NotSubscribed(_))
        ));

        let _sub = algo.subscribe().unwrap();
        let handle = algo.go(CancelToken::new()).unwrap();
        assert!(matches!(
            algo.go(CancelToken::new()),
            Err(StrategyError::AlreadyStarted(_))
        ));
        handle.await.unwrap();
        assert!(!algo.is_running());
    }

    #[tokio::test]
    async fn test_request_outcome_round_trip_persists_context() {
        let repo = Arc::new(InMemoryAlgoRepository::new());
        let frames = vec![frame(99.0, 100.0, 1.0, 99.0), frame(101.0, 100.0, 1.0, 101.0)];
        let algo = algorithm(frames, Some(repo.clone() as Arc<dyn AlgoRepository>));
        let mut sub = algo.subscribe().unwrap();
        let handle = algo.go(CancelToken::new()).unwrap();

        let mut request = sub.requests.recv().await.unwrap();
        assert_eq!(request.direction, Side::Buy);
        assert_eq!(request.account_id, "acc");
        assert_eq!(request.requested_price, Some(dec!(101)));
        assert_eq!(request.lot_amount, None);
        assert_eq!(
            request.expiration_time - request.timestamp,
            TimeDelta::seconds(300)
        );

        request.succeed(dec!(101), 2, dec!(0.1));
        sub.outcomes.send(request).unwrap();

        handle.await.unwrap();
        assert!(sub.requests.recv().await.is_none());

        let stored = repo.get("algo-1").await.unwrap().unwrap();
        assert!(!stored.is_active);
        let context = stored.context().unwrap();
        assert_eq!(context.instrument("SBER").unwrap().held_lots, 2);
        assert_eq!(algo.config().context().unwrap(), context);
    }

    #[tokio::test]
    async fn test_stop_cancels_the_loop() {
        let algo = algorithm(vec![frame(99.0, 100.0, 1.0, 99.0)], None);
        let mut sub = algo.subscribe().unwrap();
        let handle = algo.go(CancelToken::new()).unwrap();
        assert!(algo.is_running());

        algo.stop();
        algo.stop();
        handle.await.unwrap();
        assert!(!algo.is_running());
        assert!(sub.requests.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_outcome_keeps_holdings() {
        let frames = vec![frame(99.0, 100.0, 1.0, 99.0), frame(101.0, 100.0, 1.0, 101.0)];
        let algo = algorithm(frames, None);
        let mut sub = algo.subscribe().unwrap();
        let handle = algo.go(CancelToken::new()).unwrap();

        let mut request = sub.requests.recv().await.unwrap();
        request.fail("insufficient funds");
        assert_eq!(request.status, ActionStatus::Failed);
        sub.outcomes.send(request).unwrap();

        handle.await.unwrap();
        assert!(algo.config().context().unwrap().instruments.is_empty());
    }
}
