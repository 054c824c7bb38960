//! CLI definitions.

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "autotrade")]
#[command(author, version, about = "Trend-following trading engine and backtester")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: PathBuf,

    /// Log level
    #[arg(short, long, default_value = "info")]
    pub log_level: LogLevel,

    /// Enable JSON log format
    #[arg(long)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Backtest one configured algorithm over a CSV history
    Backtest(BacktestArgs),
    /// Backtest every parameter set of a range configuration
    BacktestRange(BacktestRangeArgs),
    /// Run configured algorithms against the paper exchange fed from a CSV replay
    Sandbox(SandboxArgs),
    /// Import a CSV history and print what was stored
    LoadHistory(LoadHistoryArgs),
    /// List available strategies
    Strategies,
    /// Validate configuration
    ValidateConfig,
}

#[derive(clap::Args)]
pub struct HistoryArgs {
    /// History file (CSV)
    #[arg(short, long)]
    pub data: PathBuf,

    /// Instrument id for rows without an instrument column
    #[arg(short, long)]
    pub instrument: Option<String>,
}

#[derive(clap::Args)]
pub struct BacktestArgs {
    /// Configured algorithm id
    #[arg(short, long)]
    pub algorithm: String,

    #[command(flatten)]
    pub history: HistoryArgs,

    /// Output format
    #[arg(long, default_value = "text")]
    pub output: OutputFormat,

    /// Save results to file
    #[arg(long)]
    pub save: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct BacktestRangeArgs {
    /// Configured algorithm id whose parameters hold ranges
    #[arg(short, long)]
    pub algorithm: String,

    #[command(flatten)]
    pub history: HistoryArgs,

    /// Simulators running at once (defaults to backtest.workers)
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Output format
    #[arg(long, default_value = "text")]
    pub output: OutputFormat,

    /// Save results to file
    #[arg(long)]
    pub save: Option<PathBuf>,
}

#[derive(clap::Args)]
pub struct SandboxArgs {
    /// Algorithms to start (all configured ones when omitted)
    #[arg(short, long, value_delimiter = ',')]
    pub algorithms: Vec<String>,

    #[command(flatten)]
    pub history: HistoryArgs,

    /// Pause after each replayed candle, in milliseconds
    #[arg(long, default_value = "5")]
    pub pace_ms: u64,
}

#[derive(clap::Args)]
pub struct LoadHistoryArgs {
    #[command(flatten)]
    pub history: HistoryArgs,
}
