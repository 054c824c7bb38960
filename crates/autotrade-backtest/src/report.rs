//! Range backtest report generation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::BacktestResult;

/// A parameter set whose run did not produce a result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunError {
    pub algorithm_id: String,
    pub error: String,
}

/// Outcome of a parameter sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeReport {
    /// Currency the best run is chosen by
    pub reference_currency: String,
    pub workers: usize,
    /// Parameter sets submitted
    pub total: usize,
    /// Parameter sets never started because of cancellation
    pub skipped: usize,
    /// Highest number of simulators seen running at once
    pub peak_concurrency: usize,
    pub elapsed_ms: u64,
    /// Completed runs, best first once finalized
    pub results: Vec<BacktestResult>,
    pub errors: Vec<RunError>,
}

impl RangeReport {
    pub fn new(reference_currency: impl Into<String>, workers: usize) -> Self {
        Self {
            reference_currency: reference_currency.into(),
            workers,
            total: 0,
            skipped: 0,
            peak_concurrency: 0,
            elapsed_ms: 0,
            results: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn push(&mut self, result: BacktestResult) {
        self.results.push(result);
    }

    pub fn push_error(&mut self, algorithm_id: impl Into<String>, error: impl Into<String>) {
        self.errors.push(RunError {
            algorithm_id: algorithm_id.into(),
            error: error.into(),
        });
    }

    /// Order results by reference balance, highest first; ties keep id order.
    pub fn finalize(&mut self) {
        let currency = self.reference_currency.clone();
        self.results.sort_by(|a, b| {
            b.balance(&currency)
                .cmp(&a.balance(&currency))
                .then_with(|| a.algorithm_id.cmp(&b.algorithm_id))
        });
        self.errors.sort_by(|a, b| a.algorithm_id.cmp(&b.algorithm_id));
    }

    /// Run with the highest final balance in the reference currency.
    pub fn best(&self) -> Option<&BacktestResult> {
        let currency = &self.reference_currency;
        self.results
            .iter()
            .max_by(|a, b| {
                a.balance(currency)
                    .cmp(&b.balance(currency))
                    .then_with(|| b.algorithm_id.cmp(&a.algorithm_id))
            })
    }

    /// Generate a text summary.
    pub fn summary(&self) -> String {
        let mut s = String::new();

        s.push_str("═══════════════════════════════════════════════════════════\n");
        s.push_str("                  RANGE BACKTEST REPORT                     \n");
        s.push_str("═══════════════════════════════════════════════════════════\n\n");

        s.push_str("EXECUTION\n");
        s.push_str("───────────────────────────────────────────────────────────\n");
        s.push_str(&format!("  Parameter Sets:      {}\n", self.total));
        s.push_str(&format!("  Completed:           {}\n", self.results.len()));
        s.push_str(&format!("  Failed:              {}\n", self.errors.len()));
        s.push_str(&format!("  Skipped:             {}\n", self.skipped));
        s.push_str(&format!(
            "  Workers:             {} (peak {})\n",
            self.workers, self.peak_concurrency
        ));
        s.push_str(&format!("  Elapsed:             {} ms\n", self.elapsed_ms));
        s.push('\n');

        if let Some(best) = self.best() {
            s.push_str("BEST RESULT\n");
            s.push_str("───────────────────────────────────────────────────────────\n");
            s.push_str(&format!("  Algorithm:           {}\n", best.algorithm_id));
            for (key, value) in best.parameters.iter() {
                s.push_str(&format!("  {:<21}{}\n", format!("{}:", key), value));
            }
            s.push_str(&format!(
                "  {:<21}{:.2}\n",
                format!("Balance ({}):", self.reference_currency),
                best.balance(&self.reference_currency)
            ));
            s.push_str(&format!(
                "  Trades:              {} buys, {} sells, {} failed\n",
                best.buy_count, best.sell_count, best.failed_count
            ));
            s.push('\n');
        }

        if !self.results.is_empty() {
            s.push_str("TOP RESULTS\n");
            s.push_str("───────────────────────────────────────────────────────────\n");
            for result in self.results.iter().take(10) {
                let balance = format!("{:.2}", result.balance(&self.reference_currency));
                s.push_str(&format!(
                    "  {:<24} {:>14} {:>6} trades\n",
                    result.algorithm_id,
                    balance,
                    result.trades()
                ));
            }
            s.push('\n');
        }

        if !self.errors.is_empty() {
            s.push_str("ERRORS\n");
            s.push_str("───────────────────────────────────────────────────────────\n");
            for error in &self.errors {
                s.push_str(&format!("  {}: {}\n", error.algorithm_id, error.error));
            }
            s.push('\n');
        }

        s.push_str("═══════════════════════════════════════════════════════════\n");
        s
    }

    /// Export to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Balance of the best run, zero when nothing completed.
    pub fn best_balance(&self) -> Decimal {
        self.best()
            .map(|b| b.balance(&self.reference_currency))
            .unwrap_or(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotrade_core::types::Parameters;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn result(id: &str, balance: Decimal) -> BacktestResult {
        BacktestResult {
            algorithm_id: id.into(),
            parameters: Parameters::new().with("short_duration", 3),
            balances: HashMap::from([("rub".to_string(), balance)]),
            holdings: HashMap::new(),
            commission: HashMap::new(),
            buy_count: 2,
            sell_count: 2,
            failed_count: 0,
        }
    }

    #[test]
    fn test_best_by_reference_balance() {
        let mut report = RangeReport::new("rub", 4);
        report.push(result("grid#0", dec!(-15)));
        report.push(result("grid#1", dec!(42.5)));
        report.push(result("grid#2", dec!(12)));
        report.push_error("grid#3", "no history");
        report.total = 4;
        report.finalize();

        assert_eq!(report.best().unwrap().algorithm_id, "grid#1");
        assert_eq!(report.results[0].algorithm_id, "grid#1");
        assert_eq!(report.results[2].algorithm_id, "grid#0");
        assert_eq!(report.best_balance(), dec!(42.5));
    }

    #[test]
    fn test_report_summary() {
        let mut report = RangeReport::new("rub", 4);
        report.push(result("grid#1", dec!(42.5)));
        report.push_error("grid#3", "no history");
        report.total = 2;
        report.peak_concurrency = 2;
        report.finalize();

        let summary = report.summary();
        assert!(summary.contains("RANGE BACKTEST REPORT"));
        assert!(summary.contains("grid#1"));
        assert!(summary.contains("42.50"));
        assert!(summary.contains("short_duration"));
        assert!(summary.contains("grid#3: no history"));

        let json = report.to_json().unwrap();
        assert!(json.contains("\"peak_concurrency\": 2"));
    }

    #[test]
    fn test_empty_report_has_no_best() {
        let report = RangeReport::new("usd", 1);
        assert!(report.best().is_none());
        assert_eq!(report.best_balance(), Decimal::ZERO);
        assert!(!report.summary().contains("BEST RESULT"));
    }
}
