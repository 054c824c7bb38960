//! Paper exchange for the sandbox environment.

use async_trait::async_trait;
use autotrade_core::error::ExchangeError;
use autotrade_core::traits::{CandleFeed, Exchange};
use autotrade_core::types::{
    price_to_decimal, Account, Candle, CandleInterval, InstrumentInfo, OrderRequest, OrderState,
    OrderStatus, OrderType, Positions, SecurityPosition, Side,
};
use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, info};

const FEED_CAPACITY: usize = 256;

/// Order resting on the paper book.
#[derive(Debug, Clone)]
struct PaperOrder {
    state: OrderState,
    client_order_id: String,
    order_type: OrderType,
    limit: Option<Decimal>,
    /// Units per lot of the instrument
    lot: i64,
    currency: String,
    /// Money or units reserved at posting
    reserved: Decimal,
    executed_value: Decimal,
}

impl PaperOrder {
    fn remaining_lots(&self) -> i64 {
        self.state.lots_requested - self.state.lots_executed
    }

    /// Price the order trades at on `candle`, if it trades at all.
    fn fill_price(&self, candle: &Candle) -> Option<Decimal> {
        let close = price_to_decimal(candle.close)?;
        let (low, high) = (price_to_decimal(candle.low)?, price_to_decimal(candle.high)?);
        match (self.order_type, self.limit) {
            (OrderType::Market, _) | (OrderType::Limit, None) => Some(close),
            (OrderType::Limit, Some(limit)) => match self.state.direction {
                Side::Buy if low <= limit => Some(limit.min(close)),
                Side::Sell if high >= limit => Some(limit.max(close)),
                _ => None,
            },
        }
    }
}

struct Subscriber {
    instruments: HashSet<String>,
    tx: mpsc::Sender<Result<Candle, ExchangeError>>,
}

#[derive(Default)]
struct Book {
    instruments: HashMap<String, InstrumentInfo>,
    money: HashMap<String, Decimal>,
    blocked_money: HashMap<String, Decimal>,
    /// Units held per instrument
    holdings: HashMap<String, i64>,
    blocked_units: HashMap<String, i64>,
    orders: HashMap<String, PaperOrder>,
    last_prices: HashMap<String, Decimal>,
    candles: HashMap<String, Vec<Candle>>,
    clock: Option<DateTime<Utc>>,
    next_order: u64,
}

impl Book {
    fn instrument(&self, instrument_id: &str) -> Result<&InstrumentInfo, ExchangeError> {
        self.instruments
            .get(instrument_id)
            .ok_or_else(|| ExchangeError::InstrumentNotFound(instrument_id.to_string()))
    }

    fn release(&mut self, order: &PaperOrder) {
        match order.state.direction {
            Side::Buy => {
                *self.blocked_money.entry(order.currency.clone()).or_default() -= order.reserved;
                *self.money.entry(order.currency.clone()).or_default() += order.reserved;
            }
            Side::Sell => {
                let units = order.reserved.to_i64().unwrap_or(0);
                *self
                    .blocked_units
                    .entry(order.state.instrument_id.clone())
                    .or_default() -= units;
            }
        }
    }
}

/// In-memory exchange with one account.
///
/// Candles pushed through [`PaperExchange::push_candle`] drive everything:
/// resting orders trade against them, subscribers receive them and they are
/// kept for history queries. Market orders fill at the close of the next
/// candle; limit orders fill once the candle range reaches the limit.
pub struct PaperExchange {
    account: Account,
    commission_rate: Decimal,
    /// Maximum lots filled per candle and order, unlimited when `None`
    liquidity: Option<i64>,
    book: Mutex<Book>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl PaperExchange {
    pub fn new(account_id: impl Into<String>) -> Self {
        let id = account_id.into();
        Self {
            account: Account {
                name: format!("Paper {}", id),
                id,
            },
            commission_rate: dec!(0.0005),
            liquidity: None,
            book: Mutex::new(Book::default()),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Set the commission charged as a fraction of the traded value.
    pub fn with_commission(mut self, rate: Decimal) -> Self {
        self.commission_rate = rate;
        self
    }

    /// Cap the lots an order can fill on a single candle.
    pub fn with_liquidity(mut self, lots_per_candle: i64) -> Self {
        self.liquidity = Some(lots_per_candle.max(1));
        self
    }

    pub fn account_id(&self) -> &str {
        &self.account.id
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn add_instrument(&self, info: InstrumentInfo) {
        self.book().instruments.insert(info.instrument_id.clone(), info);
    }

    /// Replace the session and direction flags of a known instrument.
    pub fn update_instrument(&self, info: InstrumentInfo) -> Result<(), ExchangeError> {
        let mut book = self.book();
        book.instrument(&info.instrument_id)?;
        book.instruments.insert(info.instrument_id.clone(), info);
        Ok(())
    }

    /// Credit free money in `currency`.
    pub fn deposit(&self, currency: &str, amount: Decimal) {
        *self.book().money.entry(currency.to_lowercase()).or_default() += amount;
    }

    /// Credit instrument units held outside of any order.
    pub fn add_holding(&self, instrument_id: &str, units: i64) {
        *self.book().holdings.entry(instrument_id.to_string()).or_default() += units;
    }

    /// Time of the latest pushed candle.
    pub fn clock(&self) -> Option<DateTime<Utc>> {
        self.book().clock
    }

    /// Feed one candle into the venue.
    ///
    /// Returns the orders whose state changed.
    pub fn push_candle(&self, candle: Candle) -> Vec<OrderState> {
        let changed = {
            let mut book = self.book();
            if let Some(price) = price_to_decimal(candle.close) {
                book.last_prices.insert(candle.instrument_id.clone(), price);
            }
            book.clock = Some(book.clock.map_or(candle.time, |t| t.max(candle.time)));
            book.candles
                .entry(candle.instrument_id.clone())
                .or_default()
                .push(candle.clone());
            self.match_orders(&mut book, &candle)
        };
        self.broadcast(&candle);
        changed
    }

    fn match_orders(&self, book: &mut Book, candle: &Candle) -> Vec<OrderState> {
        let ids: Vec<String> = book
            .orders
            .iter()
            .filter(|(_, o)| o.state.status.is_active() && o.state.instrument_id == candle.instrument_id)
            .map(|(id, _)| id.clone())
            .collect();

        let mut changed = Vec::new();
        for id in ids {
            let Some(mut order) = book.orders.remove(&id) else {
                continue;
            };
            if let Some(price) = order.fill_price(candle) {
                let lots = self
                    .liquidity
                    .map_or(order.remaining_lots(), |cap| cap.min(order.remaining_lots()));
                self.execute(book, &mut order, lots, price);
                changed.push(order.state.clone());
            }
            book.orders.insert(id, order);
        }
        changed
    }

    fn execute(&self, book: &mut Book, order: &mut PaperOrder, lots: i64, price: Decimal) {
        let units = lots * order.lot;
        let value = price * Decimal::from(units);
        let commission = value * self.commission_rate;
        let currency = order.currency.clone();
        let instrument_id = order.state.instrument_id.clone();

        match order.state.direction {
            Side::Buy => {
                // Executed value leaves the reservation, commission is paid from free money
                let share = order.reserved * Decimal::from(lots) / Decimal::from(order.remaining_lots());
                *book.blocked_money.entry(currency.clone()).or_default() -= share;
                order.reserved -= share;
                *book.money.entry(currency).or_default() += share - value - commission;
                *book.holdings.entry(instrument_id).or_default() += units;
            }
            Side::Sell => {
                *book.blocked_units.entry(instrument_id.clone()).or_default() -= units;
                order.reserved -= Decimal::from(units);
                *book.holdings.entry(instrument_id).or_default() -= units;
                *book.money.entry(currency).or_default() += value - commission;
            }
        }

        order.executed_value += value;
        order.state.lots_executed += lots;
        order.state.commission += commission;
        order.state.executed_price =
            Some(order.executed_value / Decimal::from(order.state.lots_executed * order.lot));
        order.state.status = if order.remaining_lots() == 0 {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        debug!(
            order_id = %order.state.order_id,
            instrument_id = %order.state.instrument_id,
            lots,
            price = %price,
            status = ?order.state.status,
            "Paper order executed"
        );
    }

    fn broadcast(&self, candle: &Candle) {
        self.subscribers().retain(|sub| {
            if !sub.instruments.contains(&candle.instrument_id) {
                return !sub.tx.is_closed();
            }
            match sub.tx.try_send(Ok(candle.clone())) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(instrument_id = %candle.instrument_id, "Subscriber lagging, candle dropped");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Terminate every open market data stream with `error`.
    pub fn disconnect_streams(&self, error: ExchangeError) {
        for sub in self.subscribers().drain(..) {
            let _ = sub.tx.try_send(Err(error.clone()));
        }
    }

    /// Close every open market data stream without an error.
    pub fn close_streams(&self) {
        self.subscribers().clear();
    }

    fn reject(order_id: String, request: &OrderRequest, reason: String) -> OrderState {
        OrderState {
            order_id,
            account_id: request.account_id.clone(),
            instrument_id: request.instrument_id.clone(),
            direction: request.direction,
            status: OrderStatus::Rejected,
            lots_requested: request.lots,
            lots_executed: 0,
            executed_price: None,
            commission: Decimal::ZERO,
            message: Some(reason),
        }
    }

    fn check_account(&self, account_id: &str) -> Result<(), ExchangeError> {
        if account_id != self.account.id {
            return Err(ExchangeError::AccountNotFound(account_id.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Exchange for PaperExchange {
    async fn get_historical_candles(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        _interval: CandleInterval,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let book = self.book();
        book.instrument(instrument_id)?;
        Ok(book
            .candles
            .get(instrument_id)
            .map(|candles| {
                candles
                    .iter()
                    .filter(|c| c.time >= from && c.time < to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn subscribe_candles(&self, instrument_ids: &[String]) -> Result<CandleFeed, ExchangeError> {
        {
            let book = self.book();
            for id in instrument_ids {
                book.instrument(id)?;
            }
        }
        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        self.subscribers().push(Subscriber {
            instruments: instrument_ids.iter().cloned().collect(),
            tx,
        });
        info!(instruments = ?instrument_ids, "Paper candle subscription opened");
        Ok(rx)
    }

    async fn unsubscribe(&self, instrument_ids: &[String]) -> Result<(), ExchangeError> {
        self.subscribers().retain_mut(|sub| {
            for id in instrument_ids {
                sub.instruments.remove(id);
            }
            !sub.instruments.is_empty()
        });
        Ok(())
    }

    async fn post_order(&self, request: OrderRequest) -> Result<OrderState, ExchangeError> {
        self.check_account(&request.account_id)?;
        let mut book = self.book();

        if let Some(existing) = book
            .orders
            .values()
            .find(|o| o.client_order_id == request.client_order_id)
        {
            return Ok(existing.state.clone());
        }

        let info = book.instrument(&request.instrument_id)?.clone();
        if request.lots <= 0 {
            return Err(ExchangeError::OrderRejected("lots must be positive".into()));
        }
        if request.order_type == OrderType::Limit && request.price.is_none() {
            return Err(ExchangeError::OrderRejected("limit order without price".into()));
        }

        book.next_order += 1;
        let order_id = format!("paper-{}", book.next_order);
        let units = request.lots * info.lot;

        let reserved = match request.direction {
            Side::Buy => {
                let price = request
                    .price
                    .or_else(|| book.last_prices.get(&request.instrument_id).copied())
                    .ok_or_else(|| ExchangeError::OrderRejected("no price for market order".into()))?;
                let cost = price * Decimal::from(units);
                // Market orders may trade above the last price
                let reserve = match request.order_type {
                    OrderType::Limit => cost,
                    OrderType::Market => cost * (Decimal::ONE + self.commission_rate),
                };
                let free = book.money.get(&info.currency).copied().unwrap_or(Decimal::ZERO);
                if free < reserve {
                    let state = Self::reject(
                        order_id.clone(),
                        &request,
                        format!("not enough money: required {}, available {}", reserve, free),
                    );
                    return Ok(state);
                }
                *book.money.entry(info.currency.clone()).or_default() -= reserve;
                *book.blocked_money.entry(info.currency.clone()).or_default() += reserve;
                reserve
            }
            Side::Sell => {
                let held = book.holdings.get(&request.instrument_id).copied().unwrap_or(0);
                let blocked = book.blocked_units.get(&request.instrument_id).copied().unwrap_or(0);
                if held - blocked < units {
                    let state = Self::reject(
                        order_id.clone(),
                        &request,
                        format!("not enough units: required {}, available {}", units, held - blocked),
                    );
                    return Ok(state);
                }
                *book.blocked_units.entry(request.instrument_id.clone()).or_default() += units;
                Decimal::from(units)
            }
        };

        let order = PaperOrder {
            state: OrderState {
                order_id: order_id.clone(),
                account_id: request.account_id.clone(),
                instrument_id: request.instrument_id.clone(),
                direction: request.direction,
                status: OrderStatus::New,
                lots_requested: request.lots,
                lots_executed: 0,
                executed_price: None,
                commission: Decimal::ZERO,
                message: None,
            },
            client_order_id: request.client_order_id,
            order_type: request.order_type,
            limit: request.price,
            lot: info.lot,
            currency: info.currency,
            reserved,
            executed_value: Decimal::ZERO,
        };
        let state = order.state.clone();
        book.orders.insert(order_id, order);
        debug!(
            order_id = %state.order_id,
            instrument_id = %state.instrument_id,
            direction = %state.direction,
            lots = state.lots_requested,
            "Paper order accepted"
        );
        Ok(state)
    }

    async fn cancel_order(&self, account_id: &str, order_id: &str) -> Result<(), ExchangeError> {
        self.check_account(account_id)?;
        let mut book = self.book();
        let order = book
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))?;
        if order.state.status.is_terminal() {
            return Err(ExchangeError::OrderRejected(format!(
                "order {} is already {:?}",
                order_id, order.state.status
            )));
        }

        book.release(&order);
        if let Some(stored) = book.orders.get_mut(order_id) {
            stored.reserved = Decimal::ZERO;
            stored.state.status = OrderStatus::Cancelled;
            stored.state.message = Some("cancelled by client".into());
        }
        Ok(())
    }

    async fn get_order_state(&self, account_id: &str, order_id: &str) -> Result<OrderState, ExchangeError> {
        self.check_account(account_id)?;
        self.book()
            .orders
            .get(order_id)
            .map(|o| o.state.clone())
            .ok_or_else(|| ExchangeError::OrderNotFound(order_id.to_string()))
    }

    async fn get_positions(&self, account_id: &str) -> Result<Positions, ExchangeError> {
        self.check_account(account_id)?;
        let book = self.book();
        let mut securities: Vec<SecurityPosition> = book
            .holdings
            .iter()
            .filter(|(_, units)| **units != 0)
            .map(|(id, units)| SecurityPosition {
                instrument_id: id.clone(),
                balance: *units,
                blocked: book.blocked_units.get(id).copied().unwrap_or(0),
            })
            .collect();
        securities.sort_by(|a, b| a.instrument_id.cmp(&b.instrument_id));

        Ok(Positions {
            money: book.money.clone(),
            blocked_money: book.blocked_money.clone(),
            securities,
        })
    }

    async fn get_last_prices(
        &self,
        instrument_ids: &[String],
    ) -> Result<HashMap<String, Decimal>, ExchangeError> {
        let book = self.book();
        Ok(instrument_ids
            .iter()
            .filter_map(|id| book.last_prices.get(id).map(|p| (id.clone(), *p)))
            .collect())
    }

    async fn get_accounts(&self) -> Result<Vec<Account>, ExchangeError> {
        Ok(vec![self.account.clone()])
    }

    async fn get_instrument_info(&self, instrument_id: &str) -> Result<InstrumentInfo, ExchangeError> {
        self.book().instrument(instrument_id).cloned()
    }

    fn name(&self) -> &str {
        "Paper Exchange"
    }
}
