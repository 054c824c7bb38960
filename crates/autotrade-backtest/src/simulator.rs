//! Simulated fills against historical prices.

use autotrade_core::error::ValidationError;
use autotrade_core::types::{
    price_to_decimal, ActionRequest, AlgorithmConfig, HistoryRecord, Parameters, Side, Subscription,
};
use autotrade_risk::{order_cost, LotSizer, MoneyLimits};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

const PRICE_SCALE: u32 = 6;

/// Time-ordered prices of one instrument.
#[derive(Debug, Clone, Default)]
pub struct PriceSeries {
    points: Vec<(DateTime<Utc>, Decimal)>,
}

impl PriceSeries {
    pub fn new(mut points: Vec<(DateTime<Utc>, Decimal)>) -> Self {
        points.sort_by_key(|(time, _)| *time);
        Self { points }
    }

    /// Group history records into one series per instrument.
    pub fn from_records(records: &[HistoryRecord]) -> HashMap<String, PriceSeries> {
        let mut grouped: HashMap<String, Vec<(DateTime<Utc>, Decimal)>> = HashMap::new();
        for record in records {
            if let Some(price) = price_to_decimal(record.price) {
                grouped
                    .entry(record.instrument_id.clone())
                    .or_default()
                    .push((record.time, price));
            }
        }
        grouped
            .into_iter()
            .map(|(id, points)| (id, PriceSeries::new(points)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<Decimal> {
        self.points.last().map(|(_, price)| *price)
    }

    /// Price at `time`.
    ///
    /// Exact samples are returned as is, times between two samples are
    /// interpolated linearly and times outside the series take the edge price.
    pub fn price_at(&self, time: DateTime<Utc>) -> Option<Decimal> {
        let (first, last) = (self.points.first()?, self.points.last()?);
        match self.points.binary_search_by_key(&time, |(t, _)| *t) {
            Ok(i) => Some(self.points[i].1),
            Err(0) => Some(first.1),
            Err(i) if i == self.points.len() => Some(last.1),
            Err(i) => {
                let (t0, p0) = self.points[i - 1];
                let (t1, p1) = self.points[i];
                let span = (t1 - t0).num_milliseconds();
                let offset = (time - t0).num_milliseconds();
                let price = p0 + (p1 - p0) * Decimal::from(offset) / Decimal::from(span);
                Some(price.round_dp(PRICE_SCALE).normalize())
            }
        }
    }
}

/// Lot size and settlement currency of an instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub lot: i64,
    pub currency: String,
}

impl InstrumentSpec {
    pub fn new(lot: i64, currency: impl Into<String>) -> Self {
        Self {
            lot,
            currency: currency.into(),
        }
    }
}

/// Everything a simulator needs to know about the market, shared by all runs.
#[derive(Debug, Clone, Default)]
pub struct MarketData {
    pub prices: HashMap<String, PriceSeries>,
    pub instruments: HashMap<String, InstrumentSpec>,
    /// Commission as a fraction of the traded value, charged on both sides
    pub commission: Decimal,
}

impl MarketData {
    pub fn new(
        records: &[HistoryRecord],
        instruments: HashMap<String, InstrumentSpec>,
        commission: Decimal,
    ) -> Self {
        Self {
            prices: PriceSeries::from_records(records),
            instruments,
            commission,
        }
    }
}

/// Final state of one simulated run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub algorithm_id: String,
    pub parameters: Parameters,
    /// Net money flow per currency
    pub balances: HashMap<String, Decimal>,
    /// Units still held per instrument
    pub holdings: HashMap<String, i64>,
    pub commission: HashMap<String, Decimal>,
    pub buy_count: usize,
    pub sell_count: usize,
    pub failed_count: usize,
}

impl BacktestResult {
    fn empty(algorithm_id: String, parameters: Parameters) -> Self {
        Self {
            algorithm_id,
            parameters,
            balances: HashMap::new(),
            holdings: HashMap::new(),
            commission: HashMap::new(),
            buy_count: 0,
            sell_count: 0,
            failed_count: 0,
        }
    }

    /// Final balance in `currency`, zero when never traded.
    pub fn balance(&self, currency: &str) -> Decimal {
        self.balances.get(currency).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn trades(&self) -> usize {
        self.buy_count + self.sell_count
    }

    /// Generate a text summary.
    pub fn summary(&self) -> String {
        let mut s = String::new();

        s.push_str("═══════════════════════════════════════════════════════════\n");
        s.push_str("                     BACKTEST RESULT                        \n");
        s.push_str("═══════════════════════════════════════════════════════════\n\n");
        s.push_str(&format!("  Algorithm:           {}\n", self.algorithm_id));
        for (key, value) in self.parameters.iter() {
            s.push_str(&format!("  {:<21}{}\n", format!("{}:", key), value));
        }
        s.push_str(&format!(
            "  Trades:              {} buys, {} sells, {} failed\n\n",
            self.buy_count, self.sell_count, self.failed_count
        ));

        let mut currencies: Vec<_> = self.balances.keys().collect();
        currencies.sort();
        for currency in currencies {
            let commission = self.commission.get(currency).copied().unwrap_or(Decimal::ZERO);
            s.push_str(&format!(
                "  {:<21}{:.2} (commission {:.2})\n",
                format!("Balance ({}):", currency),
                self.balance(currency),
                commission
            ));
        }
        let mut held: Vec<_> = self.holdings.iter().filter(|(_, units)| **units != 0).collect();
        held.sort();
        for (instrument, units) in held {
            s.push_str(&format!("  {:<21}{} units\n", format!("Held {}:", instrument), units));
        }

        s.push_str("═══════════════════════════════════════════════════════════\n");
        s
    }
}

/// Executor answering every request synchronously from price history.
pub struct BacktestSimulator {
    market: Arc<MarketData>,
    money_limits: MoneyLimits,
    result: BacktestResult,
    next_order: u64,
}

impl BacktestSimulator {
    pub fn new(config: &AlgorithmConfig, market: Arc<MarketData>) -> Self {
        Self {
            market,
            money_limits: MoneyLimits::new(config.money_limits.clone()),
            result: BacktestResult::empty(config.id.clone(), config.parameters.clone()),
            next_order: 0,
        }
    }

    /// Fill or fail one request in place.
    pub fn execute(&mut self, action: &mut ActionRequest) {
        if let Err(reason) = self.fill(action) {
            debug!(
                algorithm_id = %action.algorithm_id,
                instrument_id = %action.instrument_id,
                reason = %reason,
                "Simulated action failed"
            );
            action.fail(reason.to_string());
            self.result.failed_count += 1;
        }
    }

    fn fill(&mut self, action: &mut ActionRequest) -> Result<(), ValidationError> {
        let spec = self
            .market
            .instruments
            .get(&action.instrument_id)
            .ok_or_else(|| ValidationError::NotTradable(action.instrument_id.clone()))?;
        let price = self
            .market
            .prices
            .get(&action.instrument_id)
            .and_then(|series| series.price_at(action.timestamp))
            .ok_or_else(|| ValidationError::PriceUnavailable(action.instrument_id.clone()))?;

        let lots = match action.direction {
            Side::Buy => {
                let limit = self.money_limits.for_currency(&spec.currency)?;
                let affordable = LotSizer::new(spec.lot).lots_for_budget(limit, price);
                action.lot_amount.map_or(affordable, |requested| requested.min(affordable))
            }
            Side::Sell => action.lot_amount.unwrap_or(0),
        };
        if lots <= 0 {
            return Err(ValidationError::ZeroQuantity);
        }

        let units = lots * spec.lot;
        let value = order_cost(price, lots, spec.lot);
        let commission = value * self.market.commission;
        let balance = self.result.balances.entry(spec.currency.clone()).or_default();
        let held = self
            .result
            .holdings
            .entry(action.instrument_id.clone())
            .or_default();
        match action.direction {
            Side::Buy => {
                *balance -= value + commission;
                *held += units;
                self.result.buy_count += 1;
            }
            Side::Sell => {
                *balance += value - commission;
                // Units bought before the simulated period are not tracked
                *held = (*held - units).max(0);
                self.result.sell_count += 1;
            }
        }
        *self
            .result
            .commission
            .entry(spec.currency.clone())
            .or_default() += commission;

        self.next_order += 1;
        action.mark_posted(format!("sim-{}", self.next_order));
        action.succeed(price, lots, commission);
        Ok(())
    }

    /// Serve `subscription` until the algorithm closes it, then publish the result.
    pub async fn run(mut self, mut subscription: Subscription, results: mpsc::Sender<BacktestResult>) {
        while let Some(mut action) = subscription.requests.recv().await {
            self.execute(&mut action);
            if subscription.outcomes.send(action).is_err() {
                debug!(algorithm_id = %subscription.algorithm_id, "Outcome dropped");
            }
        }
        if results.send(self.finish()).await.is_err() {
            debug!(algorithm_id = %subscription.algorithm_id, "Result receiver dropped");
        }
    }

    pub fn finish(self) -> BacktestResult {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autotrade_core::types::{ActionStatus, OrderType};
    use chrono::{TimeDelta, TimeZone};
    use rust_decimal_macros::dec;

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap() + TimeDelta::minutes(minutes)
    }

    fn series() -> PriceSeries {
        PriceSeries::new(vec![(t(2), dec!(110)), (t(0), dec!(100)), (t(4), dec!(90))])
    }

    fn market() -> Arc<MarketData> {
        let mut prices = HashMap::new();
        prices.insert("SBER".to_string(), series());
        let mut instruments = HashMap::new();
        instruments.insert("SBER".to_string(), InstrumentSpec::new(10, "rub"));
        Arc::new(MarketData {
            prices,
            instruments,
            commission: dec!(0.001),
        })
    }

    fn simulator() -> BacktestSimulator {
        let mut config = AlgorithmConfig::new("bt", "trend_crossover");
        config.money_limits.insert("rub".into(), dec!(2500));
        BacktestSimulator::new(&config, market())
    }

    fn action(direction: Side, minute: i64, lots: Option<i64>) -> ActionRequest {
        let mut action = ActionRequest::new(
            "bt",
            "acc",
            "SBER",
            direction,
            OrderType::Limit,
            t(minute),
            t(minute + 5),
        );
        action.lot_amount = lots;
        action
    }

    #[test]
    fn test_price_interpolation() {
        let series = series();
        assert_eq!(series.price_at(t(2)), Some(dec!(110)));
        assert_eq!(series.price_at(t(1)), Some(dec!(105)));
        assert_eq!(series.price_at(t(3)), Some(dec!(100)));
        assert_eq!(series.price_at(t(0) + TimeDelta::seconds(15)), Some(dec!(101.25)));
        assert_eq!(series.price_at(t(-10)), Some(dec!(100)));
        assert_eq!(series.price_at(t(60)), Some(dec!(90)));
        assert_eq!(PriceSeries::default().price_at(t(0)), None);
    }

    #[test]
    fn test_buy_then_sell_updates_balance() {
        let mut sim = simulator();

        let mut buy = action(Side::Buy, 0, None);
        sim.execute(&mut buy);
        assert_eq!(buy.status, ActionStatus::Success);
        // floor(2500 / (10 * 100)) = 2 lots
        assert_eq!(buy.lots_filled, 2);
        assert_eq!(buy.position_price, Some(dec!(100)));
        assert_eq!(buy.commission, dec!(2));

        let mut sell = action(Side::Sell, 2, Some(2));
        sim.execute(&mut sell);
        assert_eq!(sell.status, ActionStatus::Success);
        assert_eq!(sell.position_price, Some(dec!(110)));

        let result = sim.finish();
        assert_eq!(result.balance("rub"), dec!(-2002) + dec!(2200) - dec!(2.2));
        assert_eq!(result.holdings["SBER"], 0);
        assert_eq!(result.buy_count, 1);
        assert_eq!(result.sell_count, 1);
        assert_eq!(result.commission["rub"], dec!(4.2));

        let summary = result.summary();
        assert!(summary.contains("1 buys, 1 sells, 0 failed"));
        assert!(summary.contains("195.80 (commission 4.20)"));
    }

    #[test]
    fn test_requested_lots_cap_buys() {
        let mut sim = simulator();
        let mut buy = action(Side::Buy, 0, Some(1));
        sim.execute(&mut buy);
        assert_eq!(buy.lots_filled, 1);
    }

    #[test]
    fn test_holdings_never_negative() {
        let mut sim = simulator();
        let mut sell = action(Side::Sell, 0, Some(3));
        sim.execute(&mut sell);
        assert_eq!(sell.status, ActionStatus::Success);

        let result = sim.finish();
        assert_eq!(result.holdings["SBER"], 0);
        assert!(result.balance("rub") > Decimal::ZERO);
    }

    #[test]
    fn test_failures() {
        let mut sim = simulator();

        let mut sell = action(Side::Sell, 0, None);
        sim.execute(&mut sell);
        assert_eq!(sell.status, ActionStatus::Failed);
        assert_eq!(sell.message.as_deref(), Some("order quantity is zero"));

        let mut unknown = action(Side::Buy, 0, None);
        unknown.instrument_id = "GAZP".into();
        sim.execute(&mut unknown);
        assert_eq!(
            unknown.message.as_deref(),
            Some("instrument GAZP is not available for trading")
        );

        let mut config = AlgorithmConfig::new("bt", "trend_crossover");
        config.money_limits.insert("usd".into(), dec!(2500));
        let mut sim_usd = BacktestSimulator::new(&config, market());
        let mut buy = action(Side::Buy, 0, None);
        sim_usd.execute(&mut buy);
        assert_eq!(buy.status, ActionStatus::Failed);

        assert_eq!(sim.finish().failed_count, 2);
    }

    #[tokio::test]
    async fn test_run_answers_every_request_and_publishes_result() {
        let (subscription, channels) = Subscription::pair("bt");
        let (results_tx, mut results_rx) = mpsc::channel(1);
        let task = tokio::spawn(simulator().run(subscription, results_tx));

        let mut outcomes = channels.outcomes;
        channels.requests.send(action(Side::Buy, 1, None)).await.unwrap();
        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(outcome.status, ActionStatus::Success);
        assert_eq!(outcome.position_price, Some(dec!(105)));

        drop(channels.requests);
        let result = results_rx.recv().await.unwrap();
        assert_eq!(result.algorithm_id, "bt");
        assert_eq!(result.buy_count, 1);
        task.await.unwrap();
    }
}
