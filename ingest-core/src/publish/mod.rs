use tokio::sync::broadcast;
use tracing::trace;

use crate::model::RowKey;

#[derive(Debug, Clone)]
pub struct RowKeyEvent {
    pub metric_name: String,
    pub row_key: RowKey,
    pub ttl_sec: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct BatchReductionEvent {
    pub effective_limit: usize,
}

const CHANNEL_CAPACITY: usize = 1024;

/// Fire-and-forget fan-out for the two index notification kinds, one
/// dedicated `broadcast` channel each. Publishing never blocks the handler:
/// a subscriber that falls behind simply misses the oldest events (it's
/// told so via `RecvError::Lagged`) rather than applying backpressure.
/// Subscribers are expected to reconcile from the stored indexes on
/// restart, so dropped notifications are not a correctness problem.
pub struct IndexEventPublisher {
    row_key_tx: broadcast::Sender<RowKeyEvent>,
    batch_reduction_tx: broadcast::Sender<BatchReductionEvent>,
}

impl IndexEventPublisher {
    pub fn new() -> Self {
        let (row_key_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let (batch_reduction_tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            row_key_tx,
            batch_reduction_tx,
        }
    }

    pub fn subscribe_row_key(&self) -> broadcast::Receiver<RowKeyEvent> {
        self.row_key_tx.subscribe()
    }

    pub fn subscribe_batch_reduction(&self) -> broadcast::Receiver<BatchReductionEvent> {
        self.batch_reduction_tx.subscribe()
    }

    /// No-op if there are currently no subscribers - that's not an error,
    /// just nobody listening yet.
    pub fn publish_row_key(&self, event: RowKeyEvent) {
        if self.row_key_tx.send(event).is_err() {
            trace!("row key event published with no subscribers");
        }
    }

    pub fn publish_batch_reduction(&self, event: BatchReductionEvent) {
        if self.batch_reduction_tx.send(event).is_err() {
            trace!("batch reduction event published with no subscribers");
        }
    }
}

impl Default for IndexEventPublisher {
    fn default() -> Self {
        Self::new()
    }
}
