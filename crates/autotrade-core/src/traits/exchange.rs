//! Exchange trait definition.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::mpsc;

use crate::error::ExchangeError;
use crate::types::{
    Account, Candle, CandleInterval, InstrumentInfo, OrderRequest, OrderState, Positions,
};

/// Items delivered by a market data subscription.
///
/// The receiver ending (or yielding an error) means the stream terminated.
pub type CandleFeed = mpsc::Receiver<Result<Candle, ExchangeError>>;

/// Trait for brokerage venues.
///
/// Exchanges provide market data, order placement and account information.
/// The wire-level transport lives behind this boundary.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Fetch candles in `[from, to)`, ordered from oldest to newest.
    async fn get_historical_candles(
        &self,
        instrument_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        interval: CandleInterval,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// Open a market data stream subscribed to candles of `instrument_ids`.
    async fn subscribe_candles(&self, instrument_ids: &[String]) -> Result<CandleFeed, ExchangeError>;

    /// Drop candle subscriptions for `instrument_ids`.
    async fn unsubscribe(&self, instrument_ids: &[String]) -> Result<(), ExchangeError>;

    /// Submit a new order.
    ///
    /// # Returns
    /// The exchange-side order state right after acceptance
    async fn post_order(&self, request: OrderRequest) -> Result<OrderState, ExchangeError>;

    /// Cancel an open order.
    async fn cancel_order(&self, account_id: &str, order_id: &str) -> Result<(), ExchangeError>;

    /// Get the current state of an order.
    async fn get_order_state(
        &self,
        account_id: &str,
        order_id: &str,
    ) -> Result<OrderState, ExchangeError>;

    /// Get money and securities held on an account.
    async fn get_positions(&self, account_id: &str) -> Result<Positions, ExchangeError>;

    /// Get last traded prices per instrument.
    async fn get_last_prices(
        &self,
        instrument_ids: &[String],
    ) -> Result<HashMap<String, Decimal>, ExchangeError>;

    /// Get accounts available to the client.
    async fn get_accounts(&self) -> Result<Vec<Account>, ExchangeError>;

    /// Get static and session information about an instrument.
    async fn get_instrument_info(&self, instrument_id: &str) -> Result<InstrumentInfo, ExchangeError>;

    /// Last price of a single instrument, if the exchange knows one.
    async fn get_last_price(&self, instrument_id: &str) -> Result<Option<Decimal>, ExchangeError> {
        let prices = self.get_last_prices(&[instrument_id.to_string()]).await?;
        Ok(prices.get(instrument_id).copied())
    }

    /// Get the exchange name.
    fn name(&self) -> &str;
}
