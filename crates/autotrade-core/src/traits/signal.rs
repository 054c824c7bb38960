//! Signal processor trait definition.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::cancel::CancelToken;
use crate::error::DataError;
use crate::types::SignalFrame;

/// Produces a stream of trend frames from a price source.
///
/// A processor is owned by exactly one task: take the stream, then move the
/// processor into `run`.
#[async_trait]
pub trait SignalProcessor: Send {
    /// Take the frame stream. Only the first call succeeds.
    fn stream(&mut self) -> Result<mpsc::Receiver<SignalFrame>, DataError>;

    /// Process prices until the source is exhausted, fails or `cancel` fires.
    ///
    /// The frame stream closes when this returns.
    async fn run(self: Box<Self>, cancel: CancelToken) -> Result<(), DataError>;

    /// Get the processor name.
    fn name(&self) -> &str;
}
