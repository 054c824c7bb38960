//! Error types for the trading engine.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::types::{Environment, Side};

/// Top-level trading engine error.
#[derive(Error, Debug)]
pub enum TradingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Strategy error: {0}")]
    Strategy(#[from] StrategyError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Indicator error: {0}")]
    Indicator(#[from] IndicatorError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("Execution engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Strategy, algorithm and factory errors.
#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported strategy: {0}")]
    UnsupportedStrategy(String),

    #[error("Algorithm {0} is already subscribed")]
    DoubleSubscription(String),

    #[error("Algorithm {0} has no subscription")]
    NotSubscribed(String),

    #[error("Algorithm {0} was already started")]
    AlreadyStarted(String),

    #[error("Malformed parameter {key}: {reason}")]
    ParameterFormat { key: String, reason: String },

    #[error("Missing parameter: {0}")]
    MissingParameter(String),

    #[error("No exchange configured for the {0} environment")]
    EnvironmentUnavailable(Environment),

    #[error("Algorithm not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Exchange collaborator errors.
#[derive(Error, Debug, Clone)]
pub enum ExchangeError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Order rejected: {0}")]
    OrderRejected(String),

    #[error("Order not found: {0}")]
    OrderNotFound(String),

    #[error("Instrument not found: {0}")]
    InstrumentNotFound(String),

    #[error("Account not found: {0}")]
    AccountNotFound(String),

    #[error("Market data stream closed: {0}")]
    StreamClosed(String),

    #[error("API error: {0}")]
    ApiError(String),
}

/// Signal processor and data source errors.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Signal stream was already taken")]
    StreamTaken,

    #[error("Market data stream failed after {attempts} reconnect attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("No data available for the requested instruments")]
    NoDataAvailable,

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error(transparent)]
    Exchange(#[from] ExchangeError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Indicator calculation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IndicatorError {
    #[error("Window is empty")]
    EmptyWindow,
}

/// Persistence collaborator errors.
#[derive(Error, Debug, Clone)]
pub enum RepositoryError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Execution engine usage errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Algorithm {0} is already subscribed to the engine")]
    DoubleSubscription(String),

    #[error("Execution engine is already running")]
    AlreadyStarted,

    #[error("Execution engine is shut down")]
    Closed,
}

/// Reasons an action request is refused before reaching the exchange.
///
/// The `Display` text is what gets recorded on the failed action.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("instrument {0} is not available for trading")]
    NotTradable(String),

    #[error("{side} is not allowed for instrument {instrument}")]
    DirectionNotAllowed { instrument: String, side: Side },

    #[error("trading session for {0} is closed")]
    SessionClosed(String),

    #[error("no money limit configured for currency {0}")]
    MissingMoneyLimit(String),

    #[error("no price available for instrument {0}")]
    PriceUnavailable(String),

    #[error("order quantity is zero")]
    ZeroQuantity,

    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("exchange refused the request: {0}")]
    Exchange(String),
}

/// Result type alias for trading operations.
pub type TradingResult<T> = Result<T, TradingError>;
