// AssetLens - app/events.rs
//
// Notification Channel: typed publish/subscribe events from the workers to
// the embedding UI layer.
//
// Each subscriber owns a bounded `std::sync::mpsc` channel. Publishing never
// blocks a worker: a full subscriber misses the event (logged at debug), and
// a subscriber whose receiver was dropped is removed on the next publish.

use crate::core::dataset::WorkHandle;
use crate::core::model::{Category, DataSetKey};
use parking_lot::Mutex;
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};

/// Events published by the pipeline.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// A worker committed new field values to the Record behind `handle`.
    /// Carries the handle, not a row, so it survives resorting.
    RowUpdated {
        category: Category,
        handle: WorkHandle,
    },
    /// The DataSet's row order was replaced; cached row mappings are invalid.
    DataSetResorted { key: DataSetKey },
}

/// Fan-out of pipeline events to any number of subscribers.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<SyncSender<PipelineEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber with a channel bounded to `capacity` events.
    pub fn subscribe(&self, capacity: usize) -> Receiver<PipelineEvent> {
        let (tx, rx) = mpsc::sync_channel(capacity.max(1));
        self.subscribers.lock().push(tx);
        rx
    }

    /// Deliver `event` to every live subscriber without blocking.
    pub fn publish(&self, event: PipelineEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!(event = ?event_name(&event), "Subscriber full, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("Subscriber disconnected, removing");
                false
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

fn event_name(event: &PipelineEvent) -> &'static str {
    match event {
        PipelineEvent::RowUpdated { .. } => "row_updated",
        PipelineEvent::DataSetResorted { .. } => "dataset_resorted",
    }
}
