//! Trend crossover strategy.
//!
//! Buys when the short time-weighted average crosses above the long one while
//! rising (or keeps rising steeply above it), sells when it is back below the
//! long average and the exit covers both commissions, and optionally abandons
//! a position through a fixed-percent stop-loss.

use autotrade_core::error::StrategyError;
use autotrade_core::traits::Strategy;
use autotrade_core::types::{
    price_to_decimal, ActionRequest, ActionStatus, AlgorithmConfig, AlgorithmContext,
    InstrumentContext, IntentReason, OrderType, Parameters, Side, SignalFrame, TradeIntent,
};
use autotrade_risk::{BreakEvenGate, StopLossRule};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

pub const STRATEGY_NAME: &str = "trend_crossover";

/// Parameter keys understood by the strategy.
pub mod keys {
    pub const SHORT_DURATION: &str = "short_duration";
    pub const LONG_DURATION: &str = "long_duration";
    pub const ORDER_EXPIRATION_SECS: &str = "order_expiration_secs";
    pub const COMMISSION: &str = "commission";
    pub const DERIVATIVE_THRESHOLD: &str = "derivative_threshold";
    pub const STOP_LOSS_ENABLED: &str = "stop_loss_enabled";
    pub const STOP_LOSS_PERCENT: &str = "stop_loss_percent";
}

/// Configuration for the trend crossover strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendCrossoverConfig {
    /// Short window length in minutes
    pub short_minutes: i64,
    /// Long window length in minutes
    pub long_minutes: i64,
    /// Lifetime of posted orders
    pub order_expiration_secs: i64,
    /// Commission rate charged per side
    pub commission: Decimal,
    /// Minimum relative derivative to keep buying above the long average
    pub derivative_threshold: f64,
    pub stop_loss: StopLossRule,
}

impl Default for TrendCrossoverConfig {
    fn default() -> Self {
        Self {
            short_minutes: 5,
            long_minutes: 30,
            order_expiration_secs: 300,
            commission: dec!(0.0005),
            derivative_threshold: 0.0001,
            stop_loss: StopLossRule::default(),
        }
    }
}

impl TrendCrossoverConfig {
    /// Read and validate the strategy parameters.
    pub fn from_parameters(params: &Parameters) -> Result<Self, StrategyError> {
        let defaults = Self::default();
        let config = Self {
            short_minutes: params.require(keys::SHORT_DURATION)?,
            long_minutes: params.require(keys::LONG_DURATION)?,
            order_expiration_secs: params
                .parse_or(keys::ORDER_EXPIRATION_SECS, defaults.order_expiration_secs)?,
            commission: params.parse_or(keys::COMMISSION, defaults.commission)?,
            derivative_threshold: params
                .parse_or(keys::DERIVATIVE_THRESHOLD, defaults.derivative_threshold)?,
            stop_loss: StopLossRule::new(
                params.parse_or(keys::STOP_LOSS_ENABLED, defaults.stop_loss.enabled)?,
                params.parse_or(keys::STOP_LOSS_PERCENT, defaults.stop_loss.percent)?,
            ),
        };
        config.validate()?;
        Ok(config)
    }

    /// Default parameters, as stored on a new algorithm.
    pub fn default_parameters() -> Parameters {
        let d = Self::default();
        Parameters::new()
            .with(keys::SHORT_DURATION, d.short_minutes)
            .with(keys::LONG_DURATION, d.long_minutes)
            .with(keys::ORDER_EXPIRATION_SECS, d.order_expiration_secs)
            .with(keys::COMMISSION, d.commission)
            .with(keys::DERIVATIVE_THRESHOLD, d.derivative_threshold)
            .with(keys::STOP_LOSS_ENABLED, d.stop_loss.enabled)
            .with(keys::STOP_LOSS_PERCENT, d.stop_loss.percent)
    }

    pub fn validate(&self) -> Result<(), StrategyError> {
        if self.short_minutes <= 0 {
            return Err(StrategyError::InvalidConfig(
                "Short window must be at least one minute".into(),
            ));
        }
        if self.short_minutes >= self.long_minutes {
            return Err(StrategyError::InvalidConfig(
                "Short window must be shorter than the long window".into(),
            ));
        }
        if self.order_expiration_secs <= 0 {
            return Err(StrategyError::InvalidConfig(
                "Order expiration must be positive".into(),
            ));
        }
        if self.commission < Decimal::ZERO {
            return Err(StrategyError::InvalidConfig(
                "Commission must not be negative".into(),
            ));
        }
        if self.stop_loss.percent <= Decimal::ZERO || self.stop_loss.percent >= dec!(100) {
            return Err(StrategyError::InvalidConfig(
                "Stop-loss percent must be between 0 and 100".into(),
            ));
        }
        Ok(())
    }
}

/// Per-instrument trading state.
#[derive(Debug, Clone, Default)]
struct InstrumentState {
    prev_diff: Option<f64>,
    waiting: bool,
    held_lots: i64,
    buy_price: Option<Decimal>,
}

/// Trend crossover strategy.
pub struct TrendCrossoverStrategy {
    config: TrendCrossoverConfig,
    gate: BreakEvenGate,
    instruments: HashMap<String, InstrumentState>,
}

impl TrendCrossoverStrategy {
    /// Create a strategy resuming from a persisted context.
    pub fn new(config: TrendCrossoverConfig, context: &AlgorithmContext) -> Self {
        let instruments = context
            .instruments
            .iter()
            .map(|i| {
                (
                    i.instrument_id.clone(),
                    InstrumentState {
                        held_lots: i.held_lots,
                        buy_price: i.buy_price,
                        ..Default::default()
                    },
                )
            })
            .collect();
        Self {
            gate: BreakEvenGate::new(config.commission),
            config,
            instruments,
        }
    }

    /// Build from an algorithm configuration.
    pub fn from_config(config: &AlgorithmConfig) -> Result<Self, StrategyError> {
        let params = TrendCrossoverConfig::from_parameters(&config.parameters)?;
        let context = config.context()?;
        Ok(Self::new(params, &context))
    }

    pub fn config(&self) -> &TrendCrossoverConfig {
        &self.config
    }

    pub fn held_lots(&self, instrument_id: &str) -> i64 {
        self.instruments
            .get(instrument_id)
            .map(|s| s.held_lots)
            .unwrap_or(0)
    }

    pub fn buy_price(&self, instrument_id: &str) -> Option<Decimal> {
        self.instruments.get(instrument_id).and_then(|s| s.buy_price)
    }

    fn decide(&self, state: &InstrumentState, frame: &SignalFrame, prev_diff: f64) -> Option<TradeIntent> {
        let diff = frame.diff();
        let derivative = frame.derivative;
        let price = price_to_decimal(frame.price)?;
        let intent = |direction, order_type, lots, reason| TradeIntent {
            instrument_id: frame.instrument_id.clone(),
            direction,
            order_type,
            price,
            lots,
            reason,
        };

        if state.held_lots > 0 && derivative < 0.0 {
            if let (Some(buy_price), Some(short)) =
                (state.buy_price, price_to_decimal(frame.short_average))
            {
                if self.config.stop_loss.is_triggered(buy_price, short) {
                    return Some(intent(
                        Side::Sell,
                        OrderType::Market,
                        Some(state.held_lots),
                        IntentReason::StopLoss,
                    ));
                }
            }
        }

        if derivative > 0.0 {
            let crossed_up = prev_diff < 0.0 && diff >= 0.0;
            let steep_above = prev_diff >= 0.0
                && diff > 0.0
                && frame.relative_derivative() > self.config.derivative_threshold;
            if crossed_up || steep_above {
                return Some(intent(Side::Buy, OrderType::Limit, None, IntentReason::Crossover));
            }
        }

        if state.held_lots > 0 && derivative < 0.0 && diff < 0.0 {
            // covers both a fresh downward cross and a diff staying below zero
            if self.gate.allows_sell(state.buy_price, price) {
                return Some(intent(
                    Side::Sell,
                    OrderType::Limit,
                    Some(state.held_lots),
                    IntentReason::Crossover,
                ));
            }
        }

        None
    }
}

impl Strategy for TrendCrossoverStrategy {
    fn name(&self) -> &str {
        STRATEGY_NAME
    }

    fn on_frame(&mut self, frame: &SignalFrame) -> Option<TradeIntent> {
        let mut state = self
            .instruments
            .remove(&frame.instrument_id)
            .unwrap_or_default();
        let prev_diff = state.prev_diff.replace(frame.diff());

        let intent = match prev_diff {
            Some(prev) if !state.waiting => self.decide(&state, frame, prev),
            _ => None,
        };
        if let Some(intent) = &intent {
            debug!(
                instrument_id = %intent.instrument_id,
                direction = %intent.direction,
                reason = ?intent.reason,
                price = %intent.price,
                "Trade decision"
            );
            state.waiting = true;
        }

        self.instruments.insert(frame.instrument_id.clone(), state);
        intent
    }

    fn on_outcome(&mut self, outcome: &ActionRequest) {
        let Some(state) = self.instruments.get_mut(&outcome.instrument_id) else {
            warn!(
                instrument_id = %outcome.instrument_id,
                "Outcome for an instrument the strategy does not track"
            );
            return;
        };
        state.waiting = false;

        if outcome.status != ActionStatus::Success {
            return;
        }
        match outcome.direction {
            Side::Buy => {
                if let Some(price) = outcome.position_price {
                    state.buy_price = Some(state.buy_price.map_or(price, |p| p.max(price)));
                }
                state.held_lots += outcome.lots_filled;
            }
            Side::Sell => {
                state.buy_price = None;
                state.held_lots = (state.held_lots - outcome.lots_filled).max(0);
            }
        }
    }

    fn awaiting_outcome(&self) -> bool {
        self.instruments.values().any(|s| s.waiting)
    }

    fn context(&self) -> AlgorithmContext {
        let mut instruments: Vec<InstrumentContext> = self
            .instruments
            .iter()
            .filter(|(_, s)| s.held_lots > 0 || s.buy_price.is_some())
            .map(|(id, s)| InstrumentContext {
                instrument_id: id.clone(),
                held_lots: s.held_lots,
                buy_price: s.buy_price,
            })
            .collect();
        instruments.sort_by(|a, b| a.instrument_id.cmp(&b.instrument_id));
        AlgorithmContext {
            version: AlgorithmContext::VERSION,
            instruments,
        }
    }
}
