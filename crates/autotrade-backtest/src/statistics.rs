//! Action statistics.

use autotrade_core::error::RepositoryError;
use autotrade_core::traits::ActionRepository;
use autotrade_core::types::{ActionRequest, ActionStatus, Side};
use autotrade_risk::order_cost;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::InstrumentSpec;

/// Executed money flow in one currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurrencyVolume {
    pub bought: Decimal,
    pub sold: Decimal,
    pub commission: Decimal,
}

impl CurrencyVolume {
    /// Money received minus money spent, commission included.
    pub fn net(&self) -> Decimal {
        self.sold - self.bought - self.commission
    }
}

/// Summary of everything an algorithm requested.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionStatistics {
    pub algorithm_id: String,
    pub total: usize,
    /// Actions not yet finished
    pub open: usize,
    pub success: usize,
    pub failed: usize,
    pub canceled: usize,
    pub buys: usize,
    pub sells: usize,
    pub lots_bought: i64,
    pub lots_sold: i64,
    pub volumes: BTreeMap<String, CurrencyVolume>,
    /// Failure reasons with their counts
    pub failure_reasons: BTreeMap<String, usize>,
    pub first_action: Option<DateTime<Utc>>,
    pub last_action: Option<DateTime<Utc>>,
}

impl ActionStatistics {
    /// Aggregate `actions`; instruments missing from `instruments` count but carry no volume.
    pub fn from_actions(
        algorithm_id: impl Into<String>,
        actions: &[ActionRequest],
        instruments: &HashMap<String, InstrumentSpec>,
    ) -> Self {
        let mut stats = Self {
            algorithm_id: algorithm_id.into(),
            total: actions.len(),
            ..Self::default()
        };

        for action in actions {
            stats.first_action = Some(stats.first_action.map_or(action.timestamp, |t| t.min(action.timestamp)));
            stats.last_action = Some(stats.last_action.map_or(action.timestamp, |t| t.max(action.timestamp)));

            match action.status {
                ActionStatus::Created | ActionStatus::Posted => stats.open += 1,
                ActionStatus::Failed => {
                    stats.failed += 1;
                    let reason = action.message.clone().unwrap_or_else(|| "unknown".into());
                    *stats.failure_reasons.entry(reason).or_default() += 1;
                }
                ActionStatus::Canceled => stats.canceled += 1,
                ActionStatus::Success => {
                    stats.success += 1;
                    stats.add_execution(action, instruments.get(&action.instrument_id));
                }
            }
        }
        stats
    }

    fn add_execution(&mut self, action: &ActionRequest, spec: Option<&InstrumentSpec>) {
        match action.direction {
            Side::Buy => {
                self.buys += 1;
                self.lots_bought += action.lots_filled;
            }
            Side::Sell => {
                self.sells += 1;
                self.lots_sold += action.lots_filled;
            }
        }

        let (Some(spec), Some(price)) = (spec, action.position_price) else {
            return;
        };
        let value = order_cost(price, action.lots_filled, spec.lot);
        let volume = self.volumes.entry(spec.currency.clone()).or_default();
        match action.direction {
            Side::Buy => volume.bought += value,
            Side::Sell => volume.sold += value,
        }
        volume.commission += action.commission;
    }

    /// Generate a text summary.
    pub fn summary(&self) -> String {
        let mut s = format!("Algorithm {}\n", self.algorithm_id);
        s.push_str(&format!(
            "  Actions:   {} total, {} succeeded, {} failed, {} canceled, {} open\n",
            self.total, self.success, self.failed, self.canceled, self.open
        ));
        s.push_str(&format!(
            "  Executed:  {} buys ({} lots), {} sells ({} lots)\n",
            self.buys, self.lots_bought, self.sells, self.lots_sold
        ));
        for (currency, volume) in &self.volumes {
            s.push_str(&format!(
                "  {:<10} bought {:.2}, sold {:.2}, commission {:.2}, net {:.2}\n",
                format!("{}:", currency),
                volume.bought,
                volume.sold,
                volume.commission,
                volume.net()
            ));
        }
        for (reason, count) in &self.failure_reasons {
            s.push_str(&format!("  Failed x{}: {}\n", count, reason));
        }
        s
    }
}

/// Statistics of one algorithm from the stored actions.
pub async fn get_statistics(
    actions: &dyn ActionRepository,
    algorithm_id: &str,
    instruments: &HashMap<String, InstrumentSpec>,
) -> Result<ActionStatistics, RepositoryError> {
    let stored = actions.find_by_algorithm(algorithm_id).await?;
    Ok(ActionStatistics::from_actions(algorithm_id, &stored, instruments))
}
