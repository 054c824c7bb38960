//! CSV history import.

use autotrade_core::error::DataError;
use autotrade_core::types::{Candle, HistoryRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use csv::ReaderBuilder;
use serde::Deserialize;
use std::path::Path;

/// CSV record format.
#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(
        alias = "instrument",
        alias = "Instrument",
        alias = "figi",
        alias = "ticker",
        alias = "symbol",
        default
    )]
    instrument_id: Option<String>,
    #[serde(alias = "Date", alias = "date", alias = "timestamp", alias = "Timestamp", alias = "time")]
    date: String,
    #[serde(alias = "Open", alias = "open", default)]
    open: Option<f64>,
    #[serde(alias = "High", alias = "high", default)]
    high: Option<f64>,
    #[serde(alias = "Low", alias = "low", default)]
    low: Option<f64>,
    #[serde(alias = "Close", alias = "close", alias = "Adj Close", alias = "price")]
    close: f64,
    #[serde(alias = "Volume", alias = "volume", default)]
    volume: f64,
}

/// CSV file of candles for one or several instruments.
pub struct CsvHistorySource {
    path: String,
}

impl CsvHistorySource {
    /// Create a new CSV history source.
    pub fn new(path: &str) -> Result<Self, DataError> {
        if !Path::new(path).exists() {
            return Err(DataError::NoDataAvailable);
        }
        Ok(Self {
            path: path.to_string(),
        })
    }

    /// Instrument id implied by the file name (`SBER.csv` → `SBER`).
    pub fn file_instrument(&self) -> Option<String> {
        Path::new(&self.path)
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
    }

    /// Load all candles ordered by time.
    ///
    /// Rows without an instrument column use `default_instrument`, then the
    /// file name.
    pub fn load_candles(&self, default_instrument: Option<&str>) -> Result<Vec<Candle>, DataError> {
        let fallback = default_instrument
            .map(str::to_string)
            .or_else(|| self.file_instrument());

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| DataError::ParseError(e.to_string()))?;

        let mut candles = Vec::new();
        for result in reader.deserialize() {
            let record: CsvRecord = result.map_err(|e| DataError::ParseError(e.to_string()))?;
            let instrument_id = record
                .instrument_id
                .filter(|id| !id.is_empty())
                .or_else(|| fallback.clone())
                .ok_or_else(|| {
                    DataError::ParseError(format!("row at {} has no instrument", record.date))
                })?;
            let time = parse_timestamp(&record.date)?;

            candles.push(Candle {
                instrument_id,
                time,
                open: record.open.unwrap_or(record.close),
                high: record.high.unwrap_or(record.close),
                low: record.low.unwrap_or(record.close),
                close: record.close,
                volume: record.volume,
            });
        }

        candles.sort_by_key(|c| c.time);
        Ok(candles)
    }

    /// Load history records (close prices) ordered by time.
    pub fn load_records(&self, default_instrument: Option<&str>) -> Result<Vec<HistoryRecord>, DataError> {
        Ok(self
            .load_candles(default_instrument)?
            .iter()
            .map(Candle::to_record)
            .collect())
    }
}

/// Parse various timestamp formats as UTC.
fn parse_timestamp(date_str: &str) -> Result<DateTime<Utc>, DataError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(date_str) {
        return Ok(dt.with_timezone(&Utc));
    }

    let datetime_formats = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];
    for format in datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(date_str, format) {
            return Ok(dt.and_utc());
        }
    }

    let date_formats = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"];
    for format in date_formats {
        if let Ok(d) = NaiveDate::parse_from_str(date_str, format) {
            if let Some(dt) = d.and_hms_opt(0, 0, 0) {
                return Ok(dt.and_utc());
            }
        }
    }

    // Unix timestamp; more than 10 digits means milliseconds
    if let Ok(ts) = date_str.parse::<i64>() {
        let parsed = if ts > 10_000_000_000 {
            Utc.timestamp_millis_opt(ts).single()
        } else {
            Utc.timestamp_opt(ts, 0).single()
        };
        if let Some(dt) = parsed {
            return Ok(dt);
        }
    }

    Err(DataError::ParseError(format!(
        "Could not parse date: {}",
        date_str
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> String {
        let path = std::env::temp_dir().join(format!("{}-{}", uuid::Uuid::new_v4(), name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn test_parse_timestamp() {
        assert!(parse_timestamp("2024-01-15").is_ok());
        assert!(parse_timestamp("2024-01-15 10:30:00").is_ok());
        assert!(parse_timestamp("2024-01-15T10:30:00Z").is_ok());
        assert_eq!(
            parse_timestamp("1705312800000").unwrap(),
            parse_timestamp("1705312800").unwrap()
        );
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_load_multi_instrument_file_sorted() {
        let path = write_temp(
            "history.csv",
            "instrument,time,open,high,low,close,volume\n\
             GAZP,2024-01-15 10:01:00,150,151,149,150.5,10\n\
             SBER,2024-01-15 10:00:00,270,271,269,270.2,20\n",
        );
        let records = CsvHistorySource::new(&path).unwrap().load_records(None).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].instrument_id, "SBER");
        assert_eq!(records[1].instrument_id, "GAZP");
        assert!((records[1].price - 150.5).abs() < 1e-9);
    }

    #[test]
    fn test_close_only_file_uses_default_instrument() {
        let path = write_temp("prices.csv", "date,close\n2024-01-15 10:00:00,99.5\n");
        let candles = CsvHistorySource::new(&path)
            .unwrap()
            .load_candles(Some("SBER"))
            .unwrap();

        assert_eq!(candles[0].instrument_id, "SBER");
        assert_eq!(candles[0].open, 99.5);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            CsvHistorySource::new("/nonexistent/history.csv"),
            Err(DataError::NoDataAvailable)
        ));
    }
}
