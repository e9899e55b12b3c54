use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::config::MonitorConfig;
use crate::error::Result;
use crate::jobs::model::JobStatus;
use crate::jobs::store::JobStore;

/// Upper bound on any retention window.
pub const MAX_RETENTION_DAYS: i64 = 3650;

/// Deletes old records according to the retention policy.
#[derive(Clone)]
pub struct Retention {
    store: Arc<dyn JobStore>,
    config: Arc<MonitorConfig>,
}

impl Retention {
    pub fn new(store: Arc<dyn JobStore>, config: Arc<MonitorConfig>) -> Self {
        Self { store, config }
    }

    /// Removes records created more than `days` ago whose status is in
    /// `statuses` (every status when the list is empty). `None` falls back
    /// to the configured policy. Returns the number of deleted records.
    pub async fn prune(&self, days: Option<i64>, statuses: Option<&[JobStatus]>) -> Result<u64> {
        if !self.config.enabled {
            return Ok(0);
        }
        let days = days
            .unwrap_or(self.config.retention.days)
            .clamp(0, MAX_RETENTION_DAYS);
        let statuses = statuses.unwrap_or(&self.config.retention.prune_statuses);

        let deleted = self.store.prune(cutoff_days(days), statuses).await?;
        if deleted > 0 {
            tracing::info!(deleted, days, ?statuses, "pruned job records");
        }
        Ok(deleted)
    }
}

/// "now - N days", with N clamped to `0..=MAX_RETENTION_DAYS`.
pub fn cutoff_days(days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(days.clamp(0, MAX_RETENTION_DAYS))
}
