//! Validate configuration command.

use anyhow::Result;
use std::path::Path;

use super::load;

pub async fn run(config_path: &Path) -> Result<()> {
    println!("Validating configuration: {:?}", config_path);

    match load(config_path) {
        Ok(config) => {
            println!("Configuration is valid!");
            println!();
            println!("App: {}", config.app.name);
            println!("Environment: {}", config.app.environment);
            println!("Log level: {}", config.logging.level);
            println!(
                "Stream retries: {} every {} min",
                config.retry.count, config.retry.interval_minutes
            );
            println!("Reconcile interval: {}s", config.engine.reconcile_interval_secs);
            println!(
                "Backtest workers: {} (reference currency {})",
                config.backtest.workers, config.backtest.reference_currency
            );
            println!("Instruments: {}", config.instruments.len());
            for algorithm in &config.algorithms {
                println!(
                    "Algorithm {}: {} on {}",
                    algorithm.id,
                    algorithm.strategy_name,
                    algorithm.instrument_ids.join(", ")
                );
            }
        }
        Err(e) => {
            println!("Configuration error: {:#}", e);
            return Err(e);
        }
    }

    Ok(())
}
