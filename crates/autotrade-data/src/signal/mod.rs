//! Signal processors.
//!
//! Both variants keep one [`InstrumentTrend`] per instrument and publish
//! [`SignalFrame`](autotrade_core::types::SignalFrame)s through a bounded
//! channel taken once via `stream()`.

mod historical;
mod live;
mod trend;

pub use historical::HistoricalSignalProcessor;
pub use live::{LiveSignalProcessor, RetryPolicy};
pub use trend::{DerivativeMode, InstrumentTrend};

/// Capacity of the processor → algorithm frame channel.
pub const FRAME_CHANNEL_CAPACITY: usize = 64;
