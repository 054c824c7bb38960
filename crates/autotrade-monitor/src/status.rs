//! Plain-text status board of running algorithms.

use autotrade_core::traits::Algorithm;
use autotrade_core::types::Environment;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of one algorithm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmStatus {
    pub id: String,
    pub strategy: String,
    pub environment: Environment,
    pub running: bool,
    pub instruments: Vec<String>,
    /// Instruments currently held, with their lots
    pub positions: Vec<(String, i64)>,
}

impl AlgorithmStatus {
    pub fn of(algorithm: &dyn Algorithm) -> Self {
        let config = algorithm.config();
        let positions = config
            .context()
            .map(|context| {
                context
                    .instruments
                    .into_iter()
                    .filter(|i| i.held_lots > 0)
                    .map(|i| (i.instrument_id, i.held_lots))
                    .collect()
            })
            .unwrap_or_default();
        Self {
            id: algorithm.id().to_string(),
            strategy: algorithm.strategy_name().to_string(),
            environment: algorithm.environment(),
            running: algorithm.is_running(),
            instruments: config.instrument_ids,
            positions,
        }
    }
}

/// Table of algorithm statuses taken at one moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusBoard {
    pub taken_at: DateTime<Utc>,
    pub algorithms: Vec<AlgorithmStatus>,
}

impl StatusBoard {
    pub fn new(algorithms: Vec<AlgorithmStatus>) -> Self {
        Self {
            taken_at: Utc::now(),
            algorithms,
        }
    }

    pub fn render(&self) -> String {
        let mut s = format!(
            "{:<20} {:<16} {:<10} {:<8} {:<20} {}\n",
            "ID", "STRATEGY", "ENV", "STATE", "INSTRUMENTS", "HELD"
        );
        s.push_str(&"─".repeat(90));
        s.push('\n');
        for status in &self.algorithms {
            let held = if status.positions.is_empty() {
                "-".to_string()
            } else {
                status
                    .positions
                    .iter()
                    .map(|(id, lots)| format!("{}:{}", id, lots))
                    .collect::<Vec<_>>()
                    .join(" ")
            };
            s.push_str(&format!(
                "{:<20} {:<16} {:<10} {:<8} {:<20} {}\n",
                status.id,
                status.strategy,
                status.environment.to_string(),
                if status.running { "running" } else { "stopped" },
                status.instruments.join(","),
                held
            ));
        }
        if self.algorithms.is_empty() {
            s.push_str("(no algorithms)\n");
        }
        s
    }
}
