//! Sandbox command: configured algorithms trade on the paper exchange while a
//! CSV history is replayed into it candle by candle.

use anyhow::{Context, Result};
use autotrade_data::CsvHistorySource;
use autotrade_monitor::StatusBoard;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use super::{cancel_on_ctrl_c, load, path_str};
use crate::cli::SandboxArgs;
use crate::service::TradingService;

pub async fn run(args: SandboxArgs, config_path: &Path) -> Result<()> {
    let config = load(config_path)?;
    let ids: Vec<String> = if args.algorithms.is_empty() {
        config.algorithms.iter().map(|a| a.id.clone()).collect()
    } else {
        args.algorithms.clone()
    };
    if ids.is_empty() {
        anyhow::bail!("No algorithms configured");
    }

    let candles = CsvHistorySource::new(path_str(&args.history.data)?)
        .and_then(|source| source.load_candles(args.history.instrument.as_deref()))
        .with_context(|| format!("Failed to load candles from {}", args.history.data.display()))?;
    info!(candles = candles.len(), "Replay prepared");

    let service = TradingService::new(config);
    let cancel = cancel_on_ctrl_c();
    let engine_tasks = service.start(cancel.clone())?;

    for id in &ids {
        service
            .start_trade(id)
            .await
            .with_context(|| format!("Failed to start algorithm {}", id))?;
    }
    println!("{}", StatusBoard::new(service.list_active_algorithms()).render());

    let replayed = service
        .replay(candles, Duration::from_millis(args.pace_ms), &cancel)
        .await;
    service.engine().reconcile().await;
    println!("{}", StatusBoard::new(service.list_active_algorithms()).render());

    service.stop_all().await;
    cancel.cancel();
    for task in engine_tasks {
        task.await.context("Execution engine task failed")?;
    }

    println!("Replayed {} candles", replayed);
    println!();
    for id in &ids {
        let stats = service.get_statistics(id).await?;
        println!("{}", stats.summary());
    }
    Ok(())
}
