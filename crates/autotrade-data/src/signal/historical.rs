//! Replay of stored history as trend frames.

use async_trait::async_trait;
use autotrade_core::cancel::CancelToken;
use autotrade_core::error::DataError;
use autotrade_core::traits::SignalProcessor;
use autotrade_core::types::{HistoryRecord, SignalFrame};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{DerivativeMode, InstrumentTrend, FRAME_CHANNEL_CAPACITY};

/// Signal processor over a pre-loaded, time-ordered history.
///
/// The history is shared between the instances of a parameter sweep; each
/// instance owns its own windows.
pub struct HistoricalSignalProcessor {
    history: Arc<Vec<HistoryRecord>>,
    trends: HashMap<String, InstrumentTrend>,
    frames_tx: mpsc::Sender<SignalFrame>,
    frames_rx: Option<mpsc::Receiver<SignalFrame>>,
}

impl HistoricalSignalProcessor {
    pub fn new(
        history: Arc<Vec<HistoryRecord>>,
        instrument_ids: &[String],
        short_minutes: i64,
        long_minutes: i64,
    ) -> Self {
        let trends = instrument_ids
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    InstrumentTrend::new(
                        id.clone(),
                        short_minutes,
                        long_minutes,
                        DerivativeMode::WindowScaled,
                    ),
                )
            })
            .collect();
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);

        Self {
            history,
            trends,
            frames_tx,
            frames_rx: Some(frames_rx),
        }
    }
}

#[async_trait]
impl SignalProcessor for HistoricalSignalProcessor {
    fn stream(&mut self) -> Result<mpsc::Receiver<SignalFrame>, DataError> {
        self.frames_rx.take().ok_or(DataError::StreamTaken)
    }

    async fn run(self: Box<Self>, cancel: CancelToken) -> Result<(), DataError> {
        let Self {
            history,
            mut trends,
            frames_tx,
            frames_rx,
        } = *self;
        // An untaken stream must not keep the channel open.
        drop(frames_rx);

        let mut emitted = 0usize;
        for record in history.iter() {
            if cancel.is_cancelled() {
                debug!("Historical replay cancelled");
                break;
            }
            let Some(trend) = trends.get_mut(&record.instrument_id) else {
                continue;
            };
            let Some(frame) = trend.push(record.price, record.time) else {
                continue;
            };

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                sent = frames_tx.send(frame) => {
                    if sent.is_err() {
                        debug!("Frame consumer dropped, stopping replay");
                        break;
                    }
                    emitted += 1;
                }
            }
        }

        info!(records = history.len(), frames = emitted, "Historical replay finished");
        Ok(())
    }

    fn name(&self) -> &str {
        "historical"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone, Utc};

    fn history(minutes: i64) -> Arc<Vec<HistoryRecord>> {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let mut records = Vec::new();
        for m in 0..minutes {
            let time = t0 + TimeDelta::minutes(m);
            records.push(HistoryRecord::new("SBER", time, 100.0 + m as f64));
            records.push(HistoryRecord::new("GAZP", time, 50.0));
        }
        Arc::new(records)
    }

    #[tokio::test]
    async fn test_replay_emits_frames_after_warm_up() {
        let ids = vec!["SBER".to_string()];
        let mut processor = HistoricalSignalProcessor::new(history(10), &ids, 1, 3);
        let mut frames = processor.stream().unwrap();

        Box::new(processor).run(CancelToken::new()).await.unwrap();

        let mut received = Vec::new();
        while let Some(frame) = frames.recv().await {
            received.push(frame);
        }
        // minutes 4..=9
        assert_eq!(received.len(), 6);
        assert!(received.iter().all(|f| f.instrument_id == "SBER"));
        assert!(received.iter().all(|f| f.derivative > 0.0));
    }

    #[tokio::test]
    async fn test_stream_can_be_taken_once() {
        let mut processor = HistoricalSignalProcessor::new(history(2), &["SBER".to_string()], 1, 3);
        assert!(processor.stream().is_ok());
        assert!(matches!(processor.stream(), Err(DataError::StreamTaken)));
    }

    #[tokio::test]
    async fn test_cancelled_replay_closes_stream() {
        let ids = vec!["SBER".to_string()];
        let mut processor = HistoricalSignalProcessor::new(history(500), &ids, 1, 3);
        let mut frames = processor.stream().unwrap();
        let cancel = CancelToken::new();
        let handle = tokio::spawn(Box::new(processor).run(cancel.clone()));

        assert!(frames.recv().await.is_some());
        cancel.cancel();
        handle.await.unwrap().unwrap();

        let mut rest = 0;
        while frames.recv().await.is_some() {
            rest += 1;
        }
        assert!(rest <= FRAME_CHANNEL_CAPACITY);
    }
}
