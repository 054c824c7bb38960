//! Logging setup and algorithm status reporting.

mod logging;
mod status;

pub use logging::{setup_logging, LogGuard};
pub use status::{AlgorithmStatus, StatusBoard};
