//! Data sources for trading.
//!
//! - Live and historical signal processors turning prices into trend frames
//! - CSV history import
//! - In-memory implementations of the repository contracts

mod csv_source;
mod memory;
pub mod signal;

pub use csv_source::CsvHistorySource;
pub use memory::{InMemoryActionRepository, InMemoryAlgoRepository, InMemoryHistoryRepository};
pub use signal::{
    DerivativeMode, HistoricalSignalProcessor, InstrumentTrend, LiveSignalProcessor, RetryPolicy,
};

use autotrade_core::error::DataError;
use autotrade_core::types::HistoryRecord;

/// Load history records from a CSV file.
///
/// `instrument_id` is used for rows that carry no instrument column.
pub fn load_csv(path: &str, instrument_id: Option<&str>) -> Result<Vec<HistoryRecord>, DataError> {
    let source = CsvHistorySource::new(path)?;
    source.load_records(instrument_id)
}
