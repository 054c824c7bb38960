//! Configuration structures.

use autotrade_core::error::TradingError;
use autotrade_core::types::{AlgorithmConfig, InstrumentInfo};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub engine: EngineSettings,
    #[serde(default)]
    pub backtest: BacktestSettings,
    #[serde(default)]
    pub sandbox: SandboxSettings,
    #[serde(default)]
    pub instruments: Vec<InstrumentSettings>,
    #[serde(default)]
    pub algorithms: Vec<AlgorithmConfig>,
}

impl AppConfig {
    /// Parse a TOML document without environment overrides.
    pub fn from_toml_str(raw: &str) -> Result<Self, TradingError> {
        toml::from_str(raw).map_err(|e| TradingError::Config(e.to_string()))
    }

    pub fn algorithm(&self, id: &str) -> Option<&AlgorithmConfig> {
        self.algorithms.iter().find(|a| a.id == id)
    }

    pub fn instrument(&self, id: &str) -> Option<&InstrumentSettings> {
        self.instruments.iter().find(|i| i.id == id)
    }

    /// Check cross-field rules the deserializer cannot express.
    pub fn validate(&self) -> Result<(), TradingError> {
        let invalid = |msg: String| Err(TradingError::Config(msg));

        if !matches!(
            self.logging.level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return invalid(format!("unknown log level {:?}", self.logging.level));
        }
        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return invalid(format!("unknown log format {:?}", self.logging.format));
        }
        if self.engine.reconcile_interval_secs == 0 {
            return invalid("engine.reconcile_interval_secs must be positive".into());
        }
        if self.backtest.workers == 0 {
            return invalid("backtest.workers must be positive".into());
        }
        if self.backtest.reference_currency.is_empty() {
            return invalid("backtest.reference_currency is empty".into());
        }
        if self.backtest.commission < Decimal::ZERO || self.sandbox.commission < Decimal::ZERO {
            return invalid("commission must not be negative".into());
        }

        let mut instruments = HashSet::new();
        for instrument in &self.instruments {
            if !instruments.insert(instrument.id.as_str()) {
                return invalid(format!("duplicate instrument {}", instrument.id));
            }
            if instrument.lot <= 0 {
                return invalid(format!("instrument {}: lot must be positive", instrument.id));
            }
            if instrument.min_price_increment <= Decimal::ZERO {
                return invalid(format!(
                    "instrument {}: min_price_increment must be positive",
                    instrument.id
                ));
            }
            if instrument.currency.is_empty() {
                return invalid(format!("instrument {}: currency is empty", instrument.id));
            }
        }

        let mut algorithms = HashSet::new();
        for algorithm in &self.algorithms {
            if algorithm.id.is_empty() || !algorithms.insert(algorithm.id.as_str()) {
                return invalid(format!("missing or duplicate algorithm id {:?}", algorithm.id));
            }
            if algorithm.instrument_ids.is_empty() {
                return invalid(format!("algorithm {}: no instruments", algorithm.id));
            }
            if let Some(unknown) = algorithm
                .instrument_ids
                .iter()
                .find(|id| !instruments.contains(id.as_str()))
            {
                return invalid(format!(
                    "algorithm {}: instrument {} is not configured",
                    algorithm.id, unknown
                ));
            }
            if algorithm.money_limits.values().any(|limit| *limit < Decimal::ZERO) {
                return invalid(format!("algorithm {}: negative money limit", algorithm.id));
            }
        }
        Ok(())
    }
}

/// General app settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub name: String,
    pub environment: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: "autotrade".to_string(),
            environment: "sandbox".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    /// `pretty` or `json`
    pub format: String,
    /// Directory for daily rolling log files
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    pub fn is_json(&self) -> bool {
        self.format == "json"
    }
}

/// Market data stream retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Reconnect attempts in a row without receiving a candle
    pub count: u32,
    pub interval_minutes: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            count: 3,
            interval_minutes: 1,
        }
    }
}

/// Execution engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub reconcile_interval_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            reconcile_interval_secs: 30,
        }
    }
}

/// Backtest settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestSettings {
    /// Simulators running at once in a parameter sweep
    pub workers: usize,
    /// Currency the best sweep result is chosen by
    pub reference_currency: String,
    pub commission: Decimal,
}

impl Default for BacktestSettings {
    fn default() -> Self {
        use rust_decimal_macros::dec;
        Self {
            workers: 18,
            reference_currency: "rub".to_string(),
            commission: dec!(0.0005),
        }
    }
}

/// Paper exchange settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxSettings {
    pub account_id: String,
    /// Starting money per currency
    pub money: HashMap<String, Decimal>,
    pub commission: Decimal,
}

impl Default for SandboxSettings {
    fn default() -> Self {
        use rust_decimal_macros::dec;
        Self {
            account_id: "sandbox".to_string(),
            money: HashMap::from([("rub".to_string(), dec!(100000))]),
            commission: dec!(0.0005),
        }
    }
}

fn default_true() -> bool {
    true
}

/// Static description of a tradable instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentSettings {
    pub id: String,
    #[serde(default)]
    pub ticker: Option<String>,
    pub currency: String,
    pub lot: i64,
    pub min_price_increment: Decimal,
    #[serde(default = "default_true")]
    pub buy_available: bool,
    #[serde(default = "default_true")]
    pub sell_available: bool,
}

impl InstrumentSettings {
    pub fn to_info(&self) -> InstrumentInfo {
        let mut info = InstrumentInfo::tradable(
            self.id.clone(),
            self.currency.to_lowercase(),
            self.lot,
            self.min_price_increment,
        );
        if let Some(ticker) = &self.ticker {
            info.ticker = ticker.clone();
        }
        info.buy_available = self.buy_available;
        info.sell_available = self.sell_available;
        info
    }
}
