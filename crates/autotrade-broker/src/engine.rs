//! Order execution engine.
//!
//! Every subscribed algorithm gets a forwarder task relaying its requests into
//! one shared action channel of capacity 1. A single processing task validates
//! and posts orders; a reconciliation task polls the exchange for the state of
//! pending orders, delivers terminal outcomes and cancels expired orders.

use autotrade_core::error::{EngineError, ValidationError};
use autotrade_core::traits::{ActionRepository, Exchange};
use autotrade_core::types::{
    ActionRequest, ActionStatus, OrderRequest, OrderState, OrderStatus, OrderType, Side, Subscription,
};
use autotrade_core::CancelToken;
use autotrade_risk::{normalize_price, order_cost, LotSizer, MoneyLimits};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default pause between two reconciliation passes.
pub const DEFAULT_RECONCILE_INTERVAL: Duration = Duration::from_secs(30);

const ACTION_CHANNEL_CAPACITY: usize = 1;

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Engine tuning.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub reconcile_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            reconcile_interval: DEFAULT_RECONCILE_INTERVAL,
        }
    }
}

struct SubscriptionEntry {
    generation: u64,
    outcomes: mpsc::UnboundedSender<ActionRequest>,
    money_limits: MoneyLimits,
}

/// Posted order waiting for a terminal state.
struct PendingOrder {
    action: ActionRequest,
}

struct Shared {
    exchange: Arc<dyn Exchange>,
    actions: Arc<dyn ActionRepository>,
    subscriptions: Mutex<HashMap<String, SubscriptionEntry>>,
    pending: Mutex<HashMap<String, PendingOrder>>,
    generation: AtomicU64,
    clock: Clock,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Executes the action requests of subscribed algorithms against an exchange.
pub struct OrderExecutionEngine {
    shared: Arc<Shared>,
    settings: EngineSettings,
    action_tx: mpsc::Sender<ActionRequest>,
    action_rx: Mutex<Option<mpsc::Receiver<ActionRequest>>>,
}

impl OrderExecutionEngine {
    pub fn new(
        exchange: Arc<dyn Exchange>,
        actions: Arc<dyn ActionRepository>,
        settings: EngineSettings,
    ) -> Self {
        let (action_tx, action_rx) = mpsc::channel(ACTION_CHANNEL_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                exchange,
                actions,
                subscriptions: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
                clock: Arc::new(Utc::now),
            }),
            settings,
            action_tx,
            action_rx: Mutex::new(Some(action_rx)),
        }
    }

    /// Replace the time source used for order expiry.
    ///
    /// Must be called before [`start`](Self::start).
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> DateTime<Utc> + Send + Sync + 'static,
    {
        if let Some(shared) = Arc::get_mut(&mut self.shared) {
            shared.clock = Arc::new(clock);
        }
        self
    }

    /// Register an algorithm and start relaying its requests.
    ///
    /// The subscription is dropped automatically once the algorithm closes its
    /// request channel.
    pub fn add_subscription(
        &self,
        subscription: Subscription,
        money_limits: MoneyLimits,
    ) -> Result<(), EngineError> {
        let Subscription {
            algorithm_id,
            mut requests,
            outcomes,
        } = subscription;
        let generation = self.shared.generation.fetch_add(1, Ordering::Relaxed);

        {
            let mut subscriptions = lock(&self.shared.subscriptions);
            if subscriptions.contains_key(&algorithm_id) {
                return Err(EngineError::DoubleSubscription(algorithm_id));
            }
            subscriptions.insert(
                algorithm_id.clone(),
                SubscriptionEntry {
                    generation,
                    outcomes,
                    money_limits,
                },
            );
        }
        info!(algorithm_id = %algorithm_id, "Subscription added");

        let shared = self.shared.clone();
        let action_tx = self.action_tx.clone();
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                if action_tx.send(request).await.is_err() {
                    debug!(algorithm_id = %algorithm_id, "Action channel closed");
                    break;
                }
            }
            shared.remove_generation(&algorithm_id, generation);
        });
        Ok(())
    }

    /// Close an algorithm's outcome channel and forget its pending orders.
    pub fn remove_subscription(&self, algorithm_id: &str) -> bool {
        self.shared.remove(algorithm_id)
    }

    pub fn has_subscription(&self, algorithm_id: &str) -> bool {
        lock(&self.shared.subscriptions).contains_key(algorithm_id)
    }

    pub fn pending_orders(&self) -> usize {
        lock(&self.shared.pending).len()
    }

    /// Spawn the processing and reconciliation tasks.
    ///
    /// Both run until `cancel` fires.
    pub fn start(&self, cancel: CancelToken) -> Result<Vec<JoinHandle<()>>, EngineError> {
        let mut action_rx = lock(&self.action_rx)
            .take()
            .ok_or(EngineError::AlreadyStarted)?;

        let shared = self.shared.clone();
        let token = cancel.clone();
        let processor = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    action = action_rx.recv() => match action {
                        Some(action) => shared.process(action).await,
                        None => break,
                    },
                }
            }
            debug!("Action processor stopped");
        });

        let shared = self.shared.clone();
        let period = self.settings.reconcile_interval;
        let reconciler = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => shared.reconcile().await,
                }
            }
            debug!("Reconciler stopped");
        });

        info!(
            exchange = self.shared.exchange.name(),
            reconcile_secs = period.as_secs(),
            "Execution engine started"
        );
        Ok(vec![processor, reconciler])
    }

    /// Run one reconciliation pass now.
    pub async fn reconcile(&self) {
        self.shared.reconcile().await
    }
}

impl Shared {
    fn remove(&self, algorithm_id: &str) -> bool {
        let removed = lock(&self.subscriptions).remove(algorithm_id).is_some();
        if removed {
            self.forget_pending(algorithm_id);
            info!(algorithm_id = %algorithm_id, "Subscription removed");
        }
        removed
    }

    /// Remove the subscription only if it is still the one registered under `generation`.
    fn remove_generation(&self, algorithm_id: &str, generation: u64) {
        let removed = {
            let mut subscriptions = lock(&self.subscriptions);
            match subscriptions.get(algorithm_id) {
                Some(entry) if entry.generation == generation => {
                    subscriptions.remove(algorithm_id);
                    true
                }
                _ => false,
            }
        };
        if removed {
            self.forget_pending(algorithm_id);
            info!(algorithm_id = %algorithm_id, "Subscription closed by algorithm");
        }
    }

    fn forget_pending(&self, algorithm_id: &str) {
        lock(&self.pending).retain(|_, p| p.action.algorithm_id != algorithm_id);
    }

    fn money_limits(&self, algorithm_id: &str) -> Option<MoneyLimits> {
        lock(&self.subscriptions)
            .get(algorithm_id)
            .map(|entry| entry.money_limits.clone())
    }

    fn deliver(&self, action: ActionRequest) {
        let sender = lock(&self.subscriptions)
            .get(&action.algorithm_id)
            .map(|entry| entry.outcomes.clone());
        match sender {
            Some(sender) => {
                if sender.send(action).is_err() {
                    debug!("Outcome dropped, algorithm stopped listening");
                }
            }
            None => debug!(algorithm_id = %action.algorithm_id, "Outcome dropped, no subscription"),
        }
    }

    async fn persist(&self, action: &ActionRequest) {
        if let Err(e) = self.actions.save(action).await {
            warn!(action_id = %action.id, error = %e, "Failed to persist action");
        }
    }

    /// Validate, size and post one request.
    async fn process(&self, mut action: ActionRequest) {
        let Some(limits) = self.money_limits(&action.algorithm_id) else {
            warn!(algorithm_id = %action.algorithm_id, "Request from unknown algorithm dropped");
            return;
        };

        let order = match self.prepare(&mut action, &limits).await {
            Ok(order) => order,
            Err(reason) => {
                info!(
                    algorithm_id = %action.algorithm_id,
                    instrument_id = %action.instrument_id,
                    reason = %reason,
                    "Action rejected"
                );
                action.fail(reason.to_string());
                self.persist(&action).await;
                self.deliver(action);
                return;
            }
        };

        let state = match self.exchange.post_order(order).await {
            Ok(state) => state,
            Err(e) => {
                warn!(algorithm_id = %action.algorithm_id, error = %e, "Order posting failed");
                action.fail(ValidationError::Exchange(e.to_string()).to_string());
                self.persist(&action).await;
                self.deliver(action);
                return;
            }
        };

        action.mark_posted(state.order_id.clone());
        self.persist(&action).await;
        info!(
            algorithm_id = %action.algorithm_id,
            instrument_id = %action.instrument_id,
            order_id = %state.order_id,
            direction = %action.direction,
            lots = state.lots_requested,
            "Order posted"
        );

        if state.status.is_terminal() {
            self.finish(action, &state).await;
        } else {
            lock(&self.pending).insert(state.order_id.clone(), PendingOrder { action });
        }
    }

    /// Turn a request into an exchange order, filling in price and lots.
    async fn prepare(
        &self,
        action: &mut ActionRequest,
        limits: &MoneyLimits,
    ) -> Result<OrderRequest, ValidationError> {
        let info = self
            .exchange
            .get_instrument_info(&action.instrument_id)
            .await
            .map_err(|e| ValidationError::Exchange(e.to_string()))?;

        if !info.api_trade_available {
            return Err(ValidationError::NotTradable(info.instrument_id));
        }
        if !info.allows(action.direction) {
            return Err(ValidationError::DirectionNotAllowed {
                instrument: info.instrument_id,
                side: action.direction,
            });
        }
        if !info.session_open {
            return Err(ValidationError::SessionClosed(info.instrument_id));
        }
        let budget = limits.for_currency(&info.currency)?;

        let price = match (action.order_type, action.requested_price) {
            (OrderType::Limit, Some(price)) => price,
            _ => self
                .exchange
                .get_last_price(&action.instrument_id)
                .await
                .map_err(|e| ValidationError::Exchange(e.to_string()))?
                .ok_or_else(|| ValidationError::PriceUnavailable(action.instrument_id.clone()))?,
        };
        let price = normalize_price(price, info.min_price_increment, action.direction);

        let lots = match action.direction {
            Side::Buy => {
                let affordable = LotSizer::new(info.lot).lots_for_budget(budget, price);
                action.lot_amount.map_or(affordable, |requested| requested.min(affordable))
            }
            Side::Sell => action.lot_amount.unwrap_or(0),
        };
        if lots <= 0 {
            return Err(ValidationError::ZeroQuantity);
        }

        if action.direction == Side::Buy {
            let positions = self
                .exchange
                .get_positions(&action.account_id)
                .await
                .map_err(|e| ValidationError::Exchange(e.to_string()))?;
            MoneyLimits::ensure_funds(
                order_cost(price, lots, info.lot),
                positions.available_money(&info.currency),
            )?;
        }

        action.requested_price = Some(price);
        action.lot_amount = Some(lots);
        Ok(OrderRequest {
            account_id: action.account_id.clone(),
            instrument_id: action.instrument_id.clone(),
            direction: action.direction,
            order_type: action.order_type,
            lots,
            price: (action.order_type == OrderType::Limit).then_some(price),
            client_order_id: action.id.to_string(),
        })
    }

    /// Poll every pending order once.
    async fn reconcile(&self) {
        let snapshot: Vec<(String, String, DateTime<Utc>)> = lock(&self.pending)
            .iter()
            .map(|(order_id, p)| {
                (
                    order_id.clone(),
                    p.action.account_id.clone(),
                    p.action.expiration_time,
                )
            })
            .collect();
        if snapshot.is_empty() {
            return;
        }
        debug!(pending = snapshot.len(), "Reconciling orders");

        let now = (self.clock)();
        for (order_id, account_id, expiration_time) in snapshot {
            let state = match self.exchange.get_order_state(&account_id, &order_id).await {
                Ok(state) => state,
                Err(e) => {
                    warn!(order_id = %order_id, error = %e, "Order state query failed");
                    continue;
                }
            };

            if state.status.is_terminal() {
                // Whoever removes the entry owns the delivery
                let pending = lock(&self.pending).remove(&order_id);
                if let Some(pending) = pending {
                    self.finish(pending.action, &state).await;
                }
            } else if now > expiration_time {
                info!(order_id = %order_id, "Cancelling expired order");
                if let Err(e) = self.exchange.cancel_order(&account_id, &order_id).await {
                    warn!(order_id = %order_id, error = %e, "Order cancellation failed");
                }
            }
        }
    }

    /// Record the terminal state of an order and deliver the outcome.
    async fn finish(&self, mut action: ActionRequest, state: &OrderState) {
        let price = state
            .executed_price
            .or(action.requested_price)
            .unwrap_or_default();

        match state.status {
            OrderStatus::Filled => {
                action.succeed(price, state.lots_executed, state.commission);
            }
            OrderStatus::Cancelled if state.lots_executed > 0 => {
                action.succeed(price, state.lots_executed, state.commission);
            }
            OrderStatus::Cancelled => {
                action.cancel(state.message.clone().unwrap_or_else(|| "order cancelled".into()));
            }
            OrderStatus::Rejected => {
                action.fail(state.message.clone().unwrap_or_else(|| "order rejected".into()));
            }
            OrderStatus::New | OrderStatus::PartiallyFilled => return,
        }

        let persisted = match action.status {
            ActionStatus::Success => self.actions.save(&action).await,
            status => {
                self.actions
                    .update_status_with_message(action.id, status, action.message.clone())
                    .await
            }
        };
        if let Err(e) = persisted {
            warn!(action_id = %action.id, error = %e, "Failed to persist action outcome");
        }

        info!(
            algorithm_id = %action.algorithm_id,
            order_id = %state.order_id,
            status = %action.status,
            lots = action.lots_filled,
            "Order finished"
        );
        self.deliver(action);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PaperExchange;
    use autotrade_core::types::{Candle, InstrumentInfo};
    use autotrade_data::InMemoryActionRepository;
    use chrono::{TimeDelta, TimeZone};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::collections::HashMap as Map;
    use tokio::time::timeout;

    fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    struct Fixture {
        exchange: Arc<PaperExchange>,
        actions: Arc<InMemoryActionRepository>,
        engine: OrderExecutionEngine,
        cancel: CancelToken,
    }

    fn fixture(exchange: PaperExchange) -> Fixture {
        exchange.add_instrument(InstrumentInfo::tradable("SBER", "rub", 10, dec!(0.01)));
        exchange.deposit("rub", dec!(10000));
        let exchange = Arc::new(exchange);
        let actions = Arc::new(InMemoryActionRepository::new());
        let clock_source = exchange.clone();
        let engine = OrderExecutionEngine::new(
            exchange.clone(),
            actions.clone(),
            EngineSettings {
                reconcile_interval: Duration::from_secs(3600),
            },
        )
        .with_clock(move || clock_source.clock().unwrap_or_else(start_time));
        let cancel = CancelToken::new();
        engine.start(cancel.clone()).unwrap();
        Fixture {
            exchange,
            actions,
            engine,
            cancel,
        }
    }

    fn limits() -> MoneyLimits {
        MoneyLimits::new(Map::from([("rub".to_string(), dec!(2000))]))
    }

    fn request(direction: Side, order_type: OrderType, price: Option<Decimal>) -> ActionRequest {
        let mut action = ActionRequest::new(
            "algo-1",
            "acc",
            "SBER",
            direction,
            order_type,
            start_time(),
            start_time() + TimeDelta::minutes(5),
        );
        action.requested_price = price;
        action
    }

    fn candle(minute: i64, price: f64) -> Candle {
        Candle::flat("SBER", start_time() + TimeDelta::minutes(minute), price)
    }

    async fn next_outcome(channels: &mut autotrade_core::types::AlgorithmChannels) -> ActionRequest {
        timeout(Duration::from_secs(5), channels.outcomes.recv())
            .await
            .expect("outcome timed out")
            .expect("outcome channel closed")
    }

    async fn wait_pending(engine: &OrderExecutionEngine, expected: usize) {
        for _ in 0..200 {
            if engine.pending_orders() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("pending orders never reached {}", expected);
    }

    #[tokio::test]
    async fn test_buy_is_sized_posted_and_reconciled() {
        let fx = fixture(PaperExchange::new("acc").with_commission(dec!(0.001)));
        let (sub, mut channels) = Subscription::pair("algo-1");
        fx.engine.add_subscription(sub, limits()).unwrap();

        let action = request(Side::Buy, OrderType::Limit, Some(dec!(99.999)));
        let id = action.id;
        channels.requests.send(action).await.unwrap();
        wait_pending(&fx.engine, 1).await;

        let stored = fx.actions.get(id).await.unwrap();
        assert_eq!(stored.status, ActionStatus::Posted);
        // Rounded down to the increment, 2000 / (99.99 * 10) = 2 lots
        assert_eq!(stored.requested_price, Some(dec!(99.99)));
        assert_eq!(stored.lot_amount, Some(2));

        fx.exchange.push_candle(candle(1, 99.0));
        fx.engine.reconcile().await;

        let outcome = next_outcome(&mut channels).await;
        assert_eq!(outcome.id, id);
        assert_eq!(outcome.status, ActionStatus::Success);
        assert_eq!(outcome.lots_filled, 2);
        assert_eq!(outcome.position_price, Some(dec!(99)));
        assert_eq!(fx.engine.pending_orders(), 0);
        assert_eq!(fx.actions.get(id).await.unwrap().status, ActionStatus::Success);
        fx.cancel.cancel();
    }

    #[tokio::test]
    async fn test_terminal_order_is_reported_once() {
        let fx = fixture(PaperExchange::new("acc"));
        let (sub, mut channels) = Subscription::pair("algo-1");
        fx.engine.add_subscription(sub, limits()).unwrap();

        channels
            .requests
            .send(request(Side::Buy, OrderType::Limit, Some(dec!(100))))
            .await
            .unwrap();
        wait_pending(&fx.engine, 1).await;
        fx.exchange.push_candle(candle(1, 100.0));

        let first = fx.engine.reconcile();
        let second = fx.engine.reconcile();
        tokio::join!(first, second);
        fx.engine.reconcile().await;

        next_outcome(&mut channels).await;
        assert!(channels.outcomes.try_recv().is_err());
        fx.cancel.cancel();
    }

    #[tokio::test]
    async fn test_validation_failures_never_reach_the_exchange() {
        let fx = fixture(PaperExchange::new("acc"));
        let mut closed = InstrumentInfo::tradable("SBER", "rub", 10, dec!(0.01));
        closed.session_open = false;
        fx.exchange.update_instrument(closed).unwrap();

        let (sub, mut channels) = Subscription::pair("algo-1");
        fx.engine.add_subscription(sub, limits()).unwrap();

        channels
            .requests
            .send(request(Side::Buy, OrderType::Limit, Some(dec!(100))))
            .await
            .unwrap();
        let outcome = next_outcome(&mut channels).await;
        assert_eq!(outcome.status, ActionStatus::Failed);
        assert_eq!(
            outcome.message.as_deref(),
            Some("trading session for SBER is closed")
        );
        assert!(outcome.order_id.is_none());
        assert_eq!(fx.engine.pending_orders(), 0);
        assert_eq!(
            fx.actions.get(outcome.id).await.unwrap().status,
            ActionStatus::Failed
        );
        fx.cancel.cancel();
    }

    #[tokio::test]
    async fn test_validation_reasons() {
        let fx = fixture(PaperExchange::new("acc"));
        let (sub, mut channels) = Subscription::pair("algo-1");
        fx.engine
            .add_subscription(sub, MoneyLimits::new(Map::from([("usd".to_string(), dec!(100))])))
            .unwrap();

        channels
            .requests
            .send(request(Side::Buy, OrderType::Limit, Some(dec!(100))))
            .await
            .unwrap();
        let outcome = next_outcome(&mut channels).await;
        assert_eq!(
            outcome.message.as_deref(),
            Some("no money limit configured for currency rub")
        );

        // Market order with no trades yet
        let sell = request(Side::Sell, OrderType::Market, None);
        fx.engine.remove_subscription("algo-1");
        let (sub, mut channels) = Subscription::pair("algo-1");
        fx.engine.add_subscription(sub, limits()).unwrap();
        channels.requests.send(sell).await.unwrap();
        let outcome = next_outcome(&mut channels).await;
        assert_eq!(
            outcome.message.as_deref(),
            Some("no price available for instrument SBER")
        );

        // Sell without a lot amount
        channels
            .requests
            .send(request(Side::Sell, OrderType::Limit, Some(dec!(100))))
            .await
            .unwrap();
        let outcome = next_outcome(&mut channels).await;
        assert_eq!(outcome.message.as_deref(), Some("order quantity is zero"));
        fx.cancel.cancel();
    }

    #[tokio::test]
    async fn test_insufficient_funds() {
        let fx = fixture(PaperExchange::new("acc"));
        let (sub, mut channels) = Subscription::pair("algo-1");
        fx.engine
            .add_subscription(sub, MoneyLimits::new(Map::from([("rub".to_string(), dec!(50000))])))
            .unwrap();

        channels
            .requests
            .send(request(Side::Buy, OrderType::Limit, Some(dec!(100))))
            .await
            .unwrap();
        let outcome = next_outcome(&mut channels).await;
        assert_eq!(outcome.status, ActionStatus::Failed);
        assert_eq!(
            outcome.message.as_deref(),
            Some("insufficient funds: required 50000, available 10000")
        );
        fx.cancel.cancel();
    }

    #[tokio::test]
    async fn test_expired_order_is_cancelled() {
        let fx = fixture(PaperExchange::new("acc"));
        let (sub, mut channels) = Subscription::pair("algo-1");
        fx.engine.add_subscription(sub, limits()).unwrap();

        channels
            .requests
            .send(request(Side::Buy, OrderType::Limit, Some(dec!(90))))
            .await
            .unwrap();
        wait_pending(&fx.engine, 1).await;

        // Price never reaches the limit; the clock moves past expiration
        fx.exchange.push_candle(candle(10, 100.0));
        fx.engine.reconcile().await;
        assert_eq!(fx.engine.pending_orders(), 1);
        fx.engine.reconcile().await;

        let outcome = next_outcome(&mut channels).await;
        assert_eq!(outcome.status, ActionStatus::Canceled);
        assert_eq!(outcome.lots_filled, 0);
        fx.cancel.cancel();
    }

    #[tokio::test]
    async fn test_partially_executed_cancel_is_success() {
        let fx = fixture(PaperExchange::new("acc").with_liquidity(1));
        let (sub, mut channels) = Subscription::pair("algo-1");
        fx.engine.add_subscription(sub, limits()).unwrap();

        channels
            .requests
            .send(request(Side::Buy, OrderType::Limit, Some(dec!(100))))
            .await
            .unwrap();
        wait_pending(&fx.engine, 1).await;

        fx.exchange.push_candle(candle(10, 100.0));
        fx.engine.reconcile().await;
        fx.engine.reconcile().await;

        let outcome = next_outcome(&mut channels).await;
        assert_eq!(outcome.status, ActionStatus::Success);
        assert_eq!(outcome.lots_filled, 1);
        fx.cancel.cancel();
    }

    #[tokio::test]
    async fn test_double_subscription_and_auto_removal() {
        let fx = fixture(PaperExchange::new("acc"));
        let (sub, channels) = Subscription::pair("algo-1");
        fx.engine.add_subscription(sub, limits()).unwrap();

        let (again, _channels) = Subscription::pair("algo-1");
        assert!(matches!(
            fx.engine.add_subscription(again, limits()),
            Err(EngineError::DoubleSubscription(_))
        ));

        drop(channels);
        for _ in 0..200 {
            if !fx.engine.has_subscription("algo-1") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!fx.engine.has_subscription("algo-1"));
        fx.cancel.cancel();
    }

    #[tokio::test]
    async fn test_remove_subscription_closes_outcomes() {
        let fx = fixture(PaperExchange::new("acc"));
        let (sub, mut channels) = Subscription::pair("algo-1");
        fx.engine.add_subscription(sub, limits()).unwrap();

        channels
            .requests
            .send(request(Side::Buy, OrderType::Limit, Some(dec!(90))))
            .await
            .unwrap();
        wait_pending(&fx.engine, 1).await;

        assert!(fx.engine.remove_subscription("algo-1"));
        assert_eq!(fx.engine.pending_orders(), 0);
        assert!(channels.outcomes.recv().await.is_none());
        assert!(!fx.engine.remove_subscription("algo-1"));
        fx.cancel.cancel();
    }

    #[tokio::test]
    async fn test_engine_starts_once() {
        let fx = fixture(PaperExchange::new("acc"));
        assert!(matches!(
            fx.engine.start(CancelToken::new()),
            Err(EngineError::AlreadyStarted)
        ));
        fx.cancel.cancel();
    }
}
