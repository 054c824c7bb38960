//! Live trend frames from the exchange candle feed.

use async_trait::async_trait;
use autotrade_core::cancel::CancelToken;
use autotrade_core::error::{DataError, ExchangeError};
use autotrade_core::traits::{Exchange, SignalProcessor};
use autotrade_core::types::{Candle, CandleInterval, SignalFrame};
use chrono::{TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{DerivativeMode, InstrumentTrend, FRAME_CHANNEL_CAPACITY};

/// Buffer between the raw feed receiver and signal computation.
const FEED_BUFFER_CAPACITY: usize = 256;

/// Reconnect policy for the market data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Reconnect attempts after a failure before giving up
    pub count: u32,
    /// Pause before each reconnect attempt
    pub interval: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            count: 3,
            interval: Duration::from_secs(60),
        }
    }
}

/// How one subscription of the feed ended.
enum FeedEnd {
    Cancelled,
    ConsumerGone,
    Failed {
        error: ExchangeError,
        received_any: bool,
    },
}

/// Signal processor over the exchange candle stream.
pub struct LiveSignalProcessor {
    exchange: Arc<dyn Exchange>,
    instrument_ids: Vec<String>,
    trends: HashMap<String, InstrumentTrend>,
    retry: RetryPolicy,
    frames_tx: mpsc::Sender<SignalFrame>,
    frames_rx: Option<mpsc::Receiver<SignalFrame>>,
}

impl LiveSignalProcessor {
    /// Create a processor with windows pre-populated from recent history.
    ///
    /// Fetches `long_minutes + short_minutes` of one-minute candles per
    /// instrument so frames are meaningful from the first live candle.
    pub async fn connect(
        exchange: Arc<dyn Exchange>,
        instrument_ids: Vec<String>,
        short_minutes: i64,
        long_minutes: i64,
        retry: RetryPolicy,
    ) -> Result<Self, DataError> {
        let to = Utc::now();
        let from = to - TimeDelta::minutes(long_minutes + short_minutes);

        let mut trends = HashMap::with_capacity(instrument_ids.len());
        for id in &instrument_ids {
            let mut trend =
                InstrumentTrend::new(id.clone(), short_minutes, long_minutes, DerivativeMode::PerMinute);
            let candles = exchange
                .get_historical_candles(id, from, to, CandleInterval::Minute1)
                .await?;
            for candle in &candles {
                trend.push(candle.close, candle.time);
            }
            info!(
                instrument_id = %id,
                candles = candles.len(),
                warmed_up = trend.is_populated(),
                "Prefetched history"
            );
            trends.insert(id.clone(), trend);
        }

        let (frames_tx, frames_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
        Ok(Self {
            exchange,
            instrument_ids,
            trends,
            retry,
            frames_tx,
            frames_rx: Some(frames_rx),
        })
    }

    /// Subscribe and process until the feed ends, retrying failures.
    async fn process(&mut self, cancel: &CancelToken) -> Result<(), DataError> {
        let mut failures = 0u32;
        loop {
            match self.consume_feed(cancel).await {
                FeedEnd::Cancelled => {
                    info!("Live processor cancelled");
                    return Ok(());
                }
                FeedEnd::ConsumerGone => {
                    debug!("Frame consumer dropped, stopping live processor");
                    return Ok(());
                }
                FeedEnd::Failed {
                    error,
                    received_any,
                } => {
                    if received_any {
                        failures = 0;
                    }
                    if failures >= self.retry.count {
                        return Err(DataError::RetriesExhausted {
                            attempts: failures,
                            last_error: error.to_string(),
                        });
                    }
                    failures += 1;
                    warn!(
                        attempt = failures,
                        max_attempts = self.retry.count,
                        error = %error,
                        "Market data stream failed, reconnecting"
                    );
                    if !cancel.sleep(self.retry.interval).await {
                        info!("Live processor cancelled while waiting to reconnect");
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Run one subscription of the feed to its end.
    async fn consume_feed(&mut self, cancel: &CancelToken) -> FeedEnd {
        let mut feed = match self.exchange.subscribe_candles(&self.instrument_ids).await {
            Ok(feed) => feed,
            Err(error) => {
                return FeedEnd::Failed {
                    error,
                    received_any: false,
                }
            }
        };
        info!(instruments = ?self.instrument_ids, "Subscribed to candle feed");

        let (buffer_tx, mut buffer) = mpsc::channel(FEED_BUFFER_CAPACITY);
        let forwarder = tokio::spawn(async move {
            while let Some(item) = feed.recv().await {
                if buffer_tx.send(item).await.is_err() {
                    break;
                }
            }
        });

        let mut received_any = false;
        let end = loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break FeedEnd::Cancelled,
                item = buffer.recv() => item,
            };
            match item {
                Some(Ok(candle)) => {
                    received_any = true;
                    if let Some(end) = self.on_candle(candle, cancel).await {
                        break end;
                    }
                }
                Some(Err(error)) => break FeedEnd::Failed { error, received_any },
                None => {
                    break FeedEnd::Failed {
                        error: ExchangeError::StreamClosed("candle feed ended".into()),
                        received_any,
                    }
                }
            }
        };

        forwarder.abort();
        end
    }

    async fn on_candle(&mut self, candle: Candle, cancel: &CancelToken) -> Option<FeedEnd> {
        let trend = self.trends.get_mut(&candle.instrument_id)?;
        let frame = trend.push(candle.close, candle.time)?;
        debug!(
            instrument_id = %frame.instrument_id,
            short = frame.short_average,
            long = frame.long_average,
            derivative = frame.derivative,
            "Signal frame"
        );

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Some(FeedEnd::Cancelled),
            sent = self.frames_tx.send(frame) => sent.err().map(|_| FeedEnd::ConsumerGone),
        }
    }
}

#[async_trait]
impl SignalProcessor for LiveSignalProcessor {
    fn stream(&mut self) -> Result<mpsc::Receiver<SignalFrame>, DataError> {
        self.frames_rx.take().ok_or(DataError::StreamTaken)
    }

    async fn run(self: Box<Self>, cancel: CancelToken) -> Result<(), DataError> {
        let mut this = self;
        // An untaken stream must not keep the channel open.
        drop(this.frames_rx.take());

        let result = this.process(&cancel).await;
        if let Err(e) = this.exchange.unsubscribe(&this.instrument_ids).await {
            warn!(error = %e, "Failed to unsubscribe from candle feed");
        }
        if let Err(e) = &result {
            error!(error = %e, "Live processor stopped");
        }
        result
    }

    fn name(&self) -> &str {
        "live"
    }
}
