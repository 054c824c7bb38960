//! Strategy and algorithm trait definitions.

use tokio::task::JoinHandle;

use crate::cancel::CancelToken;
use crate::error::StrategyError;
use crate::types::{
    ActionRequest, AlgorithmConfig, AlgorithmContext, Environment, SignalFrame, Subscription,
    TradeIntent,
};

/// Decision logic of an algorithm.
///
/// Strategies are synchronous state machines; the algorithm runtime feeds them
/// frames and outcomes and turns their intents into action requests.
pub trait Strategy: Send {
    /// Get the unique name of this strategy.
    fn name(&self) -> &str;

    /// Process a new frame and optionally decide to trade.
    ///
    /// Returning an intent puts the frame's instrument into the waiting state
    /// until [`Strategy::on_outcome`] is called for it.
    fn on_frame(&mut self, frame: &SignalFrame) -> Option<TradeIntent>;

    /// Apply the outcome of a previously issued request.
    fn on_outcome(&mut self, outcome: &ActionRequest);

    /// Check whether any instrument still waits for an outcome.
    fn awaiting_outcome(&self) -> bool;

    /// Runtime state to persist.
    fn context(&self) -> AlgorithmContext;
}

/// A running trading algorithm.
///
/// Algorithms consume signal frames from their bound processor, send action
/// requests through their subscription and receive outcomes back.
pub trait Algorithm: Send + Sync {
    /// Unique algorithm id.
    fn id(&self) -> &str;

    /// Name of the strategy implementation.
    fn strategy_name(&self) -> &str;

    /// Environment the algorithm trades in.
    fn environment(&self) -> Environment;

    /// Snapshot of the working configuration, context included.
    fn config(&self) -> AlgorithmConfig;

    /// Create the channel pair linking this algorithm to an executor.
    ///
    /// Fails with [`StrategyError::DoubleSubscription`] on a second call.
    fn subscribe(&self) -> Result<Subscription, StrategyError>;

    /// Start the bound signal processor and the processing loop.
    ///
    /// The returned handle completes once the loop exited.
    fn go(&self, cancel: CancelToken) -> Result<JoinHandle<()>, StrategyError>;

    /// Cancel the run. Idempotent.
    fn stop(&self);

    /// Check whether the processing loop is still running.
    fn is_running(&self) -> bool;
}
