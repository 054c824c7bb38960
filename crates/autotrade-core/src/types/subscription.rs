//! Channel pair linking an algorithm to the executor serving it.

use tokio::sync::mpsc;

use super::ActionRequest;

/// Capacity of the algorithm → executor queue.
///
/// With a single slot an algorithm blocks on its next send until the executor
/// drained the previous request.
pub const REQUEST_CHANNEL_CAPACITY: usize = 1;

/// Executor half of a subscription.
#[derive(Debug)]
pub struct Subscription {
    pub algorithm_id: String,
    /// Requests coming from the algorithm
    pub requests: mpsc::Receiver<ActionRequest>,
    /// Outcomes going back to the algorithm
    pub outcomes: mpsc::UnboundedSender<ActionRequest>,
}

/// Algorithm half of a subscription.
#[derive(Debug)]
pub struct AlgorithmChannels {
    pub requests: mpsc::Sender<ActionRequest>,
    pub outcomes: mpsc::UnboundedReceiver<ActionRequest>,
}

impl Subscription {
    /// Create both halves of a fresh subscription.
    pub fn pair(algorithm_id: impl Into<String>) -> (Subscription, AlgorithmChannels) {
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_CAPACITY);
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        (
            Subscription {
                algorithm_id: algorithm_id.into(),
                requests: request_rx,
                outcomes: outcome_tx,
            },
            AlgorithmChannels {
                requests: request_tx,
                outcomes: outcome_rx,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OrderType, Side};
    use chrono::Utc;

    fn action() -> ActionRequest {
        let now = Utc::now();
        ActionRequest::new("algo", "acc", "SBER", Side::Buy, OrderType::Limit, now, now)
    }

    #[tokio::test]
    async fn test_request_queue_holds_one_item() {
        let (mut sub, channels) = Subscription::pair("algo");

        channels.requests.send(action()).await.unwrap();
        assert!(channels.requests.try_send(action()).is_err());

        assert!(sub.requests.recv().await.is_some());
        assert!(channels.requests.try_send(action()).is_ok());
    }

    #[tokio::test]
    async fn test_dropping_executor_half_closes_outcomes() {
        let (sub, mut channels) = Subscription::pair("algo");
        sub.outcomes.send(action()).unwrap();
        drop(sub);

        assert!(channels.outcomes.recv().await.is_some());
        assert!(channels.outcomes.recv().await.is_none());
    }
}
