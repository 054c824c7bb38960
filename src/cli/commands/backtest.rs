//! Backtest command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use super::{cancel_on_ctrl_c, import_history, load, save};
use crate::cli::{BacktestArgs, OutputFormat};
use crate::service::TradingService;

pub async fn run(args: BacktestArgs, config_path: &Path) -> Result<()> {
    let service = TradingService::new(load(config_path)?);
    import_history(&service, &args.history).await?;

    info!("Starting backtest for algorithm: {}", args.algorithm);
    let result = service
        .analyze(&args.algorithm, cancel_on_ctrl_c())
        .await
        .with_context(|| format!("Backtest of {} failed", args.algorithm))?;

    let json = serde_json::to_string_pretty(&result)?;
    match args.output {
        OutputFormat::Json => println!("{}", json),
        OutputFormat::Text => println!("{}", result.summary()),
    }
    save(args.save.as_deref(), &json)
}
