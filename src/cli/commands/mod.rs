//! CLI command implementations.

pub mod backtest;
pub mod backtest_range;
pub mod load_history;
pub mod sandbox;
pub mod strategies;
pub mod validate;

use anyhow::{Context, Result};
use autotrade_config::{load_config, AppConfig};
use autotrade_core::CancelToken;
use std::path::Path;
use tracing::{info, warn};

use crate::cli::HistoryArgs;
use crate::service::{HistorySummary, TradingService};

/// Load and validate the configuration file.
pub fn load(config_path: &Path) -> Result<AppConfig> {
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Token cancelled on the first Ctrl-C.
pub fn cancel_on_ctrl_c() -> CancelToken {
    let cancel = CancelToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Interrupted, shutting down");
                token.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
    cancel
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("Path {} is not valid UTF-8", path.display()))
}

/// Import the history file into the service.
pub async fn import_history(service: &TradingService, args: &HistoryArgs) -> Result<HistorySummary> {
    if !args.data.exists() {
        anyhow::bail!(
            "Data path '{}' does not exist. Provide a CSV file with --data",
            args.data.display()
        );
    }
    service
        .load_history(path_str(&args.data)?, args.instrument.as_deref())
        .await
        .with_context(|| format!("Failed to load history from {}", args.data.display()))
}

/// Write `contents` to `path` when one was given.
pub fn save(path: Option<&Path>, contents: &str) -> Result<()> {
    if let Some(path) = path {
        std::fs::write(path, contents)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Results saved to {:?}", path);
    }
    Ok(())
}
