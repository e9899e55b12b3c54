use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::jobs::filter::{JobFilter, MAX_LIMIT};
use crate::jobs::model::ReplayRecord;
use crate::jobs::store::JobStore;
use crate::replay::orchestrator::ReplayOrchestrator;

/// What a batch operation applies to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchTarget {
    Uuids(Vec<String>),
    /// Every record matching `filter`, capped at `max_items` (or the
    /// configured limit for the operation).
    Filter {
        filter: JobFilter,
        #[serde(default)]
        max_items: Option<usize>,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
    /// uuid -> error message
    pub errors: BTreeMap<String, String>,
    pub chunks: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub replays: Vec<ReplayRecord>,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    fn record_failure(&mut self, uuid: &str, error: &MonitorError) {
        self.failed += 1;
        self.errors.insert(uuid.to_string(), error.to_string());
    }
}

/// Bulk replay and delete. Items are processed one by one in chunks; a
/// failing item is recorded and the batch carries on.
#[derive(Clone)]
pub struct BatchOperator {
    store: Arc<dyn JobStore>,
    replay: ReplayOrchestrator,
    config: Arc<MonitorConfig>,
}

impl BatchOperator {
    pub fn new(
        store: Arc<dyn JobStore>,
        replay: ReplayOrchestrator,
        config: Arc<MonitorConfig>,
    ) -> Self {
        Self {
            store,
            replay,
            config,
        }
    }

    pub async fn replay(&self, target: BatchTarget) -> Result<BatchOutcome> {
        let uuids = self.resolve(target, self.config.batch.max_replay).await?;
        let mut outcome = BatchOutcome::default();

        for chunk in uuids.chunks(self.chunk_size()) {
            outcome.chunks += 1;
            for uuid in chunk {
                match self.replay.execute(uuid).await {
                    Ok(record) => {
                        outcome.succeeded += 1;
                        outcome.replays.push(record);
                    }
                    Err(e) => outcome.record_failure(uuid, &e),
                }
            }
        }

        tracing::info!(
            requested = uuids.len(),
            succeeded = outcome.succeeded,
            failed = outcome.failed,
            chunks = outcome.chunks,
            "batch replay finished"
        );
        Ok(outcome)
    }

    pub async fn delete(&self, target: BatchTarget) -> Result<BatchOutcome> {
        let uuids = self.resolve(target, self.config.batch.max_delete).await?;
        let mut outcome = BatchOutcome::default();

        for chunk in uuids.chunks(self.chunk_size()) {
            outcome.chunks += 1;
            for uuid in chunk {
                match self.store.delete(uuid).await {
                    Ok(true) => outcome.succeeded += 1,
                    Ok(false) => outcome.record_failure(uuid, &MonitorError::NotFound(uuid.clone())),
                    Err(e) => outcome.record_failure(uuid, &e),
                }
            }
        }

        tracing::info!(
            requested = uuids.len(),
            deleted = outcome.succeeded,
            failed = outcome.failed,
            chunks = outcome.chunks,
            "batch delete finished"
        );
        Ok(outcome)
    }

    fn chunk_size(&self) -> usize {
        self.config.batch.chunk_size.max(1)
    }

    /// De-duplicated uuid list in target order.
    async fn resolve(&self, target: BatchTarget, default_cap: usize) -> Result<Vec<String>> {
        match target {
            BatchTarget::Uuids(uuids) => {
                let mut seen = HashSet::new();
                Ok(uuids
                    .into_iter()
                    .map(|u| u.trim().to_string())
                    .filter(|u| !u.is_empty() && seen.insert(u.clone()))
                    .collect())
            }
            BatchTarget::Filter { filter, max_items } => {
                let cap = max_items.unwrap_or(default_cap);
                self.collect_uuids(filter, cap).await
            }
        }
    }

    async fn collect_uuids(&self, mut filter: JobFilter, cap: usize) -> Result<Vec<String>> {
        let page = (self.chunk_size() as i64).min(MAX_LIMIT);
        filter.limit = page;
        filter.offset = 0;

        let mut seen = HashSet::new();
        let mut uuids = Vec::new();
        while uuids.len() < cap {
            let rows = self.store.query(&filter).await?;
            let fetched = rows.len() as i64;
            for record in rows {
                if uuids.len() >= cap {
                    break;
                }
                if seen.insert(record.uuid.clone()) {
                    uuids.push(record.uuid);
                }
            }
            if fetched < page {
                break;
            }
            filter.offset += page;
        }
        Ok(uuids)
    }
}
