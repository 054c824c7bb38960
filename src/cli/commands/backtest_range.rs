//! Parameter sweep command implementation.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use super::{cancel_on_ctrl_c, import_history, load, save};
use crate::cli::{BacktestRangeArgs, OutputFormat};
use crate::service::TradingService;

pub async fn run(args: BacktestRangeArgs, config_path: &Path) -> Result<()> {
    let service = TradingService::new(load(config_path)?);
    import_history(&service, &args.history).await?;

    info!("Starting range backtest for algorithm: {}", args.algorithm);
    let report = service
        .analyze_range(&args.algorithm, args.workers, cancel_on_ctrl_c())
        .await
        .with_context(|| format!("Range backtest of {} failed", args.algorithm))?;

    let json = report.to_json()?;
    match args.output {
        OutputFormat::Json => println!("{}", json),
        OutputFormat::Text => println!("{}", report.summary()),
    }
    save(args.save.as_deref(), &json)
}
