use std::sync::Arc;

use tokio::sync::mpsc;

use crate::model::{DataPointEvent, EventCompletionCallback};

/// A batch of events paired with the callback the handler must invoke
/// exactly once on completion.
pub struct IngestBatch {
    pub events: Vec<DataPointEvent>,
    pub callback: Arc<dyn EventCompletionCallback>,
}

/// Stand-in for the durable queue this service would read from in
/// production. It is deliberately thin: an in-process bounded channel that
/// lets the worker pool in `main` have something real to drain end-to-end.
/// The actual durable queue - whatever it turns out to be - plugs in here,
/// behind the same `send`/`recv` seam.
#[derive(Clone)]
pub struct IngressAdapter {
    sender: mpsc::Sender<IngestBatch>,
}

pub struct IngressReceiver {
    receiver: mpsc::Receiver<IngestBatch>,
}

impl IngressAdapter {
    pub fn bounded(capacity: usize) -> (Self, IngressReceiver) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, IngressReceiver { receiver })
    }

    pub async fn enqueue(&self, batch: IngestBatch) -> Result<(), mpsc::error::SendError<IngestBatch>> {
        self.sender.send(batch).await
    }
}

impl IngressReceiver {
    pub async fn recv(&mut self) -> Option<IngestBatch> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChannelCallback, DataPoint, DataPointValue, TagMap};

    #[tokio::test]
    async fn enqueued_batch_is_received_in_order() {
        let (adapter, mut rx) = IngressAdapter::bounded(4);
        let (callback, _done) = ChannelCallback::new();

        let events = vec![DataPointEvent::new(
            "cpu".to_string(),
            TagMap::new(),
            DataPoint {
                timestamp_ms: 0,
                value: DataPointValue::Long(1),
            },
            60,
        )
        .unwrap()];

        adapter
            .enqueue(IngestBatch {
                events,
                callback: Arc::new(callback),
            })
            .await
            .unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received.events.len(), 1);
    }
}
