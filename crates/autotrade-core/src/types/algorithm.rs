//! Algorithm configuration, parameters and persisted runtime context.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::{RepositoryError, StrategyError};

/// Where an algorithm sends its orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Live,
    Sandbox,
    Historical,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Environment::Live => "live",
            Environment::Sandbox => "sandbox",
            Environment::Historical => "historical",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "live" | "prod" => Ok(Environment::Live),
            "sandbox" => Ok(Environment::Sandbox),
            "historical" | "backtest" => Ok(Environment::Historical),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

/// String key/value parameters with typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters(BTreeMap<String, String>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style `set`.
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.set(key, value.to_string());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse an optional value.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>, StrategyError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|e| StrategyError::ParameterFormat {
                    key: key.to_string(),
                    reason: format!("{raw:?}: {e}"),
                }),
        }
    }

    /// Parse a value, falling back to `default` when absent.
    pub fn parse_or<T>(&self, key: &str, default: T) -> Result<T, StrategyError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.parse(key)?.unwrap_or(default))
    }

    /// Parse a mandatory value.
    pub fn require<T>(&self, key: &str) -> Result<T, StrategyError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.parse(key)?
            .ok_or_else(|| StrategyError::MissingParameter(key.to_string()))
    }
}

impl FromIterator<(String, String)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Persisted description of an algorithm instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmConfig {
    pub id: String,
    pub strategy_name: String,
    #[serde(default)]
    pub account_id: String,
    pub instrument_ids: Vec<String>,
    /// Maximum money spent per buy, by currency
    #[serde(default)]
    pub money_limits: HashMap<String, Decimal>,
    #[serde(default)]
    pub parameters: Parameters,
    /// Runtime state written back after every outcome
    #[serde(default)]
    pub context_parameters: Parameters,
    #[serde(default)]
    pub is_active: bool,
}

impl AlgorithmConfig {
    pub fn new(id: impl Into<String>, strategy_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            strategy_name: strategy_name.into(),
            account_id: String::new(),
            instrument_ids: Vec::new(),
            money_limits: HashMap::new(),
            parameters: Parameters::new(),
            context_parameters: Parameters::new(),
            is_active: false,
        }
    }

    /// Decode the persisted context, if any.
    pub fn context(&self) -> Result<AlgorithmContext, RepositoryError> {
        AlgorithmContext::decode(&self.context_parameters)
    }
}

/// Held amount and buy price of one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentContext {
    pub instrument_id: String,
    pub held_lots: i64,
    pub buy_price: Option<Decimal>,
}

/// Versioned runtime state an algorithm needs to resume after a restart.
///
/// Stored as JSON under [`AlgorithmContext::KEY`] in the context parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmContext {
    pub version: u32,
    pub instruments: Vec<InstrumentContext>,
}

impl Default for AlgorithmContext {
    fn default() -> Self {
        Self {
            version: Self::VERSION,
            instruments: Vec::new(),
        }
    }
}

impl AlgorithmContext {
    pub const KEY: &'static str = "context";
    pub const VERSION: u32 = 1;

    /// Read the context from `params`; a missing key yields an empty context.
    pub fn decode(params: &Parameters) -> Result<Self, RepositoryError> {
        let Some(raw) = params.get(Self::KEY) else {
            return Ok(Self::default());
        };
        let context: Self = serde_json::from_str(raw)
            .map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        if context.version > Self::VERSION {
            return Err(RepositoryError::Serialization(format!(
                "unsupported context version {}",
                context.version
            )));
        }
        Ok(context)
    }

    /// Write the context into `params`, replacing any previous value.
    pub fn encode_into(&self, params: &mut Parameters) -> Result<(), RepositoryError> {
        let raw =
            serde_json::to_string(self).map_err(|e| RepositoryError::Serialization(e.to_string()))?;
        params.set(Self::KEY, raw);
        Ok(())
    }

    pub fn instrument(&self, instrument_id: &str) -> Option<&InstrumentContext> {
        self.instruments
            .iter()
            .find(|i| i.instrument_id == instrument_id)
    }
}
