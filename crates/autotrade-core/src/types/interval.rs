//! Candle interval definitions for history queries.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candle interval supported by history queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CandleInterval {
    /// 1 minute candles
    #[serde(rename = "1m")]
    #[default]
    Minute1,
    /// 5 minute candles
    #[serde(rename = "5m")]
    Minute5,
    /// 15 minute candles
    #[serde(rename = "15m")]
    Minute15,
    /// 1 hour candles
    #[serde(rename = "1h")]
    Hour1,
    /// Daily candles
    #[serde(rename = "1d")]
    Daily,
}

impl CandleInterval {
    /// Get the duration of the interval in seconds.
    pub fn as_secs(&self) -> i64 {
        match self {
            CandleInterval::Minute1 => 60,
            CandleInterval::Minute5 => 300,
            CandleInterval::Minute15 => 900,
            CandleInterval::Hour1 => 3600,
            CandleInterval::Daily => 86400,
        }
    }

    /// Get the interval as a chrono duration.
    pub fn as_delta(&self) -> TimeDelta {
        TimeDelta::seconds(self.as_secs())
    }
}

impl fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CandleInterval::Minute1 => "1m",
            CandleInterval::Minute5 => "5m",
            CandleInterval::Minute15 => "15m",
            CandleInterval::Hour1 => "1h",
            CandleInterval::Daily => "1d",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for CandleInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "1m" | "1min" | "minute" => Ok(CandleInterval::Minute1),
            "5m" | "5min" => Ok(CandleInterval::Minute5),
            "15m" | "15min" => Ok(CandleInterval::Minute15),
            "1h" | "1hour" | "hour" => Ok(CandleInterval::Hour1),
            "1d" | "day" | "daily" => Ok(CandleInterval::Daily),
            _ => Err(format!("Invalid candle interval: {}", s)),
        }
    }
}
