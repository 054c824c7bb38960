//! History import command.

use anyhow::Result;
use std::path::Path;

use super::{import_history, load};
use crate::cli::LoadHistoryArgs;
use crate::service::TradingService;

pub async fn run(args: LoadHistoryArgs, config_path: &Path) -> Result<()> {
    let service = TradingService::new(load(config_path)?);
    let summary = import_history(&service, &args.history).await?;

    println!("History loaded from {:?}", args.history.data);
    println!();
    println!("Records:     {}", summary.records);
    println!(
        "Instruments: {}",
        summary.instruments.iter().cloned().collect::<Vec<_>>().join(", ")
    );
    if let (Some(first), Some(last)) = (summary.first, summary.last) {
        println!("From:        {}", first.format("%Y-%m-%d %H:%M:%S"));
        println!("To:          {}", last.format("%Y-%m-%d %H:%M:%S"));
    }
    Ok(())
}
