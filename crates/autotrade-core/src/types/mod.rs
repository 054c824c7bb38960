//! Core data types for the trading engine.

mod algorithm;
mod candle;
mod instrument;
mod interval;
mod order;
mod price;
mod signal;
mod subscription;

pub use algorithm::{
    AlgorithmConfig, AlgorithmContext, Environment, InstrumentContext, Parameters,
};
pub use candle::{Candle, HistoryRecord};
pub use instrument::{Account, InstrumentInfo, Positions, SecurityPosition};
pub use interval::CandleInterval;
pub use order::{ActionRequest, ActionStatus, OrderRequest, OrderState, OrderStatus, OrderType, Side};
pub use price::{decimal_to_price, price_to_decimal};
pub use signal::{IntentReason, SignalFrame, TradeIntent};
pub use subscription::{AlgorithmChannels, Subscription, REQUEST_CHANNEL_CAPACITY};
