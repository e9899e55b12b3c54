use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::jobs::events::{EventSink, MonitorEvent, NoopEvents};
use crate::jobs::model::{JobStatus, ReplayRecord};
use crate::jobs::store::JobStore;
use crate::replay::dispatcher::{JobClassResolver, QueueDispatcher};

/// Re-dispatches a stored payload as a brand new job. The original record
/// is never touched.
#[derive(Clone)]
pub struct ReplayOrchestrator {
    store: Arc<dyn JobStore>,
    dispatcher: Arc<dyn QueueDispatcher>,
    resolver: Arc<dyn JobClassResolver>,
    events: Arc<dyn EventSink>,
    config: Arc<MonitorConfig>,
}

impl ReplayOrchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<dyn QueueDispatcher>,
        resolver: Arc<dyn JobClassResolver>,
        config: Arc<MonitorConfig>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            resolver,
            events: Arc::new(NoopEvents),
            config,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    #[tracing::instrument(skip(self), err)]
    pub async fn execute(&self, uuid: &str) -> Result<ReplayRecord> {
        if !self.config.enabled {
            return Err(MonitorError::Disabled);
        }

        let record = self
            .store
            .find_by_uuid(uuid)
            .await?
            .ok_or_else(|| MonitorError::NotFound(uuid.to_string()))?;

        if record.status == JobStatus::Processing {
            return Err(MonitorError::InvalidState {
                uuid: uuid.to_string(),
                status: record.status,
            });
        }

        let payload = match (&record.payload, self.config.storage.store_payload) {
            (Some(p), true) => p,
            _ => return Err(MonitorError::PayloadUnavailable(uuid.to_string())),
        };

        if !self.resolver.is_available(&record.job_class) {
            return Err(MonitorError::ClassUnavailable(record.job_class.clone()));
        }

        if !matches!(payload, Value::Object(_)) {
            return Err(MonitorError::InvalidPayload(uuid.to_string()));
        }

        let new_job_id = self
            .dispatcher
            .push_raw(&record.connection, &record.queue, payload)
            .await
            .map_err(MonitorError::Dispatch)?;

        let replay = ReplayRecord {
            original_uuid: record.uuid.clone(),
            new_uuid: uuid::Uuid::new_v4().to_string(),
            new_job_id,
            queue: record.queue.clone(),
            connection: record.connection.clone(),
            replayed_at: Utc::now(),
        };

        tracing::info!(
            original_uuid = %replay.original_uuid,
            new_uuid = %replay.new_uuid,
            queue = %replay.queue,
            "job replayed"
        );
        self.events.publish(MonitorEvent::JobReplayRequested {
            original: record,
            replay: replay.clone(),
        });
        Ok(replay)
    }
}
