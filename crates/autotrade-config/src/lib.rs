//! Configuration management.

mod settings;

pub use settings::{
    AppConfig, AppSettings, BacktestSettings, EngineSettings, InstrumentSettings, LoggingConfig,
    RetrySettings, SandboxSettings,
};

use config::{Config, ConfigError, Environment, File};
use std::path::Path;

/// Prefix of environment variables overriding file values, e.g.
/// `AUTOTRADE__BACKTEST__WORKERS=4`.
pub const ENV_PREFIX: &str = "AUTOTRADE";

/// Load configuration from file and environment.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::from(path).required(true))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    config.try_deserialize()
}
