use serde::Serialize;
use tokio::sync::broadcast;

use crate::jobs::model::{JobRecord, ReplayRecord};

/// Domain events published after a state change is persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MonitorEvent {
    JobRecorded { record: JobRecord },
    JobCancelled { record: JobRecord },
    JobReplayRequested { original: JobRecord, replay: ReplayRecord },
}

pub trait EventSink: Send + Sync {
    fn publish(&self, event: MonitorEvent);
}

/// Discards everything.
pub struct NoopEvents;

impl EventSink for NoopEvents {
    fn publish(&self, _event: MonitorEvent) {}
}

/// Fans events out over a tokio broadcast channel. Slow subscribers lag and
/// lose events rather than block publishers.
#[derive(Clone)]
pub struct BroadcastEvents {
    tx: broadcast::Sender<MonitorEvent>,
}

impl BroadcastEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitorEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastEvents {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventSink for BroadcastEvents {
    fn publish(&self, event: MonitorEvent) {
        // No subscribers is not an error.
        let _ = self.tx.send(event);
    }
}
