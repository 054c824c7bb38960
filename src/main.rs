//! Trading engine CLI application.

mod cli;
mod service;

use anyhow::Result;
use autotrade_config::load_config;
use autotrade_monitor::setup_logging;
use clap::Parser;
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The file may be missing or broken here; commands report that themselves
    let logging = load_config(&cli.config).ok().map(|c| c.logging);
    let json = cli.json_logs || logging.as_ref().is_some_and(|l| l.is_json());
    let file = logging.and_then(|l| l.file);
    let _guard = setup_logging(cli.log_level.as_str(), json, file.as_deref());

    match cli.command {
        Commands::Backtest(args) => cli::commands::backtest::run(args, &cli.config).await,
        Commands::BacktestRange(args) => cli::commands::backtest_range::run(args, &cli.config).await,
        Commands::Sandbox(args) => cli::commands::sandbox::run(args, &cli.config).await,
        Commands::LoadHistory(args) => cli::commands::load_history::run(args, &cli.config).await,
        Commands::Strategies => cli::commands::strategies::run().await,
        Commands::ValidateConfig => cli::commands::validate::run(&cli.config).await,
    }
}
