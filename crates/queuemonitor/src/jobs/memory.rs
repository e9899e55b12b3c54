use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{MonitorError, Result};
use crate::jobs::filter::JobFilter;
use crate::jobs::model::{JobPatch, JobRecord, JobStatus, NewJobRecord};
use crate::jobs::store::{
    AggregateRow, AggregateScope, Dimension, EnqueueOutcome, FailurePattern, JobStore,
    MetricSample, StartAction, StartOutcome, StartTransition, TagStatistic,
};
use crate::jobs::transitions::{plan_start, StartPlan};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    records: BTreeMap<i64, JobRecord>,
    tags: BTreeSet<(i64, String)>,
}

impl State {
    fn insert(&mut self, new: NewJobRecord, now: DateTime<Utc>) -> JobRecord {
        self.next_id += 1;
        let record = JobRecord {
            id: self.next_id,
            uuid: new.uuid,
            job_id: new.job_id,
            job_class: new.job_class,
            display_name: new.display_name,
            connection: new.connection,
            queue: new.queue,
            payload: new.payload,
            status: new.status,
            attempt: new.attempt,
            max_attempts: new.max_attempts,
            retried_from_id: new.retried_from_id,
            server_name: Some(new.worker.server_name),
            worker_id: Some(new.worker.worker_id),
            worker_type: new.worker.worker_type,
            cpu_time_ms: None,
            memory_peak_mb: None,
            file_descriptors: None,
            duration_ms: None,
            exception: None,
            tags: new.tags,
            queued_at: new.queued_at,
            started_at: new.started_at,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.records.insert(record.id, record.clone());
        record
    }

    // Latest attempt first, then newest row.
    fn latest<'a>(&'a self, mut pred: impl FnMut(&JobRecord) -> bool) -> Option<&'a JobRecord> {
        self.records
            .values()
            .filter(|r| pred(r))
            .max_by(|a, b| a.attempt.cmp(&b.attempt).then(a.id.cmp(&b.id)))
    }

    fn patch(&mut self, id: i64, patch: &JobPatch, now: DateTime<Utc>) -> Option<JobRecord> {
        let record = self.records.get_mut(&id)?;
        patch.apply_to(record, now);
        Some(record.clone())
    }

    // Tags cascade with the record; children keep living with a null parent.
    fn remove(&mut self, ids: &HashSet<i64>) {
        self.records.retain(|id, _| !ids.contains(id));
        self.tags.retain(|(id, _)| !ids.contains(id));
        for record in self.records.values_mut() {
            if record.retried_from_id.is_some_and(|p| ids.contains(&p)) {
                record.retried_from_id = None;
            }
        }
    }

    fn matching(&self, filter: &JobFilter) -> Vec<&JobRecord> {
        self.records.values().filter(|r| filter.matches(r)).collect()
    }
}

/// In-process [`JobStore`].
///
/// Intended for tests and embedding. Every operation takes one mutex, which
/// also gives `record_start` its per-job serialization.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a fully formed record, keeping its timestamps. Returns the
    /// assigned id.
    pub fn seed(&self, mut record: JobRecord) -> i64 {
        let mut state = self.state.lock();
        state.next_id += 1;
        record.id = state.next_id;
        state.records.insert(record.id, record);
        state.next_id
    }

    /// Makes every subsequent call fail like a lost database connection.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.state.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(MonitorError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, record: NewJobRecord) -> Result<JobRecord> {
        self.check()?;
        Ok(self.state.lock().insert(record, Utc::now()))
    }

    async fn update(&self, uuid: &str, patch: JobPatch) -> Result<JobRecord> {
        self.check()?;
        let mut state = self.state.lock();
        let id = state
            .latest(|r| r.uuid == uuid)
            .map(|r| r.id)
            .ok_or_else(|| MonitorError::NotFound(uuid.to_string()))?;
        state
            .patch(id, &patch, Utc::now())
            .ok_or_else(|| MonitorError::NotFound(uuid.to_string()))
    }

    async fn update_by_id(&self, id: i64, patch: JobPatch) -> Result<JobRecord> {
        self.check()?;
        self.state
            .lock()
            .patch(id, &patch, Utc::now())
            .ok_or_else(|| MonitorError::NotFound(id.to_string()))
    }

    async fn transition(
        &self,
        id: i64,
        from: &[JobStatus],
        patch: JobPatch,
    ) -> Result<Option<JobRecord>> {
        self.check()?;
        let mut state = self.state.lock();
        match state.records.get(&id) {
            Some(r) if from.contains(&r.status) => Ok(state.patch(id, &patch, Utc::now())),
            _ => Ok(None),
        }
    }

    async fn record_enqueue(&self, record: NewJobRecord) -> Result<EnqueueOutcome> {
        self.check()?;
        let mut state = self.state.lock();
        if let Some(existing) = state.latest(|r| r.uuid == record.uuid) {
            return Ok(EnqueueOutcome {
                record: existing.clone(),
                created: false,
            });
        }
        Ok(EnqueueOutcome {
            record: state.insert(record, Utc::now()),
            created: true,
        })
    }

    async fn record_start(&self, start: StartTransition) -> Result<StartOutcome> {
        self.check()?;
        let now = Utc::now();
        let mut state = self.state.lock();

        let existing = state
            .latest(|r| r.job_id.as_deref() == Some(start.job_id.as_str()))
            .or_else(|| state.latest(|r| r.uuid == start.enqueue.uuid))
            .cloned();

        let outcome = match plan_start(existing.as_ref(), &start) {
            StartPlan::Advance { id, patch } => StartOutcome {
                record: state
                    .patch(id, &patch, now)
                    .ok_or_else(|| MonitorError::NotFound(id.to_string()))?,
                action: StartAction::Advanced,
            },
            StartPlan::Synthesize { record } => StartOutcome {
                record: state.insert(record, now),
                action: StartAction::Synthesized,
            },
            StartPlan::Retry { record } => StartOutcome {
                record: state.insert(record, now),
                action: StartAction::Retried,
            },
            StartPlan::Ignore => StartOutcome {
                record: existing.ok_or_else(|| MonitorError::NotFound(start.job_id.clone()))?,
                action: StartAction::Duplicate,
            },
        };
        Ok(outcome)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<JobRecord>> {
        self.check()?;
        Ok(self.state.lock().records.get(&id).cloned())
    }

    async fn find_by_uuid(&self, uuid: &str) -> Result<Option<JobRecord>> {
        self.check()?;
        Ok(self.state.lock().latest(|r| r.uuid == uuid).cloned())
    }

    async fn find_all_by_uuid(&self, uuid: &str) -> Result<Vec<JobRecord>> {
        self.check()?;
        let state = self.state.lock();
        let mut out: Vec<JobRecord> = state
            .records
            .values()
            .filter(|r| r.uuid == uuid)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.attempt.cmp(&b.attempt).then(a.id.cmp(&b.id)));
        Ok(out)
    }

    async fn find_by_job_id(&self, job_id: &str) -> Result<Option<JobRecord>> {
        self.check()?;
        Ok(self
            .state
            .lock()
            .latest(|r| r.job_id.as_deref() == Some(job_id))
            .cloned())
    }

    async fn find_children(&self, parent_ids: &[i64]) -> Result<Vec<JobRecord>> {
        self.check()?;
        let state = self.state.lock();
        Ok(state
            .records
            .values()
            .filter(|r| r.retried_from_id.is_some_and(|p| parent_ids.contains(&p)))
            .cloned()
            .collect())
    }

    async fn query(&self, filter: &JobFilter) -> Result<Vec<JobRecord>> {
        self.check()?;
        let state = self.state.lock();
        let mut rows = state.matching(filter);
        rows.sort_by(|a, b| filter.compare(a, b));
        Ok(rows
            .into_iter()
            .skip(filter.effective_offset() as usize)
            .take(filter.effective_limit() as usize)
            .cloned()
            .collect())
    }

    async fn count(&self, filter: &JobFilter) -> Result<i64> {
        self.check()?;
        Ok(self.state.lock().matching(filter).len() as i64)
    }

    async fn delete(&self, uuid: &str) -> Result<bool> {
        self.check()?;
        let mut state = self.state.lock();
        let ids: HashSet<i64> = state
            .records
            .values()
            .filter(|r| r.uuid == uuid)
            .map(|r| r.id)
            .collect();
        if ids.is_empty() {
            return Ok(false);
        }
        state.remove(&ids);
        Ok(true)
    }

    async fn prune(&self, cutoff: DateTime<Utc>, statuses: &[JobStatus]) -> Result<u64> {
        self.check()?;
        let mut state = self.state.lock();
        let ids: HashSet<i64> = state
            .records
            .values()
            .filter(|r| r.created_at < cutoff)
            .filter(|r| statuses.is_empty() || statuses.contains(&r.status))
            .map(|r| r.id)
            .collect();
        state.remove(&ids);
        Ok(ids.len() as u64)
    }

    async fn store_tags(&self, record_id: i64, tags: &[String]) -> Result<()> {
        self.check()?;
        let mut state = self.state.lock();
        if !state.records.contains_key(&record_id) {
            return Err(MonitorError::NotFound(record_id.to_string()));
        }
        for tag in tags {
            state.tags.insert((record_id, tag.clone()));
        }
        Ok(())
    }

    async fn all_tags(&self) -> Result<Vec<String>> {
        self.check()?;
        let state = self.state.lock();
        let tags: BTreeSet<&String> = state.tags.iter().map(|(_, t)| t).collect();
        Ok(tags.into_iter().cloned().collect())
    }

    async fn tag_statistics(&self) -> Result<Vec<TagStatistic>> {
        self.check()?;
        let state = self.state.lock();
        let mut by_tag: BTreeMap<&str, (i64, i64)> = BTreeMap::new();
        for (id, tag) in &state.tags {
            let entry = by_tag.entry(tag.as_str()).or_default();
            entry.0 += 1;
            if state.records.get(id).is_some_and(|r| r.is_successful()) {
                entry.1 += 1;
            }
        }
        let mut stats: Vec<TagStatistic> = by_tag
            .into_iter()
            .map(|(tag, (count, ok))| TagStatistic {
                tag: tag.to_string(),
                count,
                successful_count: ok,
                success_rate: percentage(ok, count),
            })
            .collect();
        stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
        Ok(stats)
    }

    async fn aggregate(
        &self,
        dimension: Dimension,
        scope: &AggregateScope,
    ) -> Result<Vec<AggregateRow>> {
        self.check()?;
        let state = self.state.lock();

        let mut groups: BTreeMap<(Option<String>, Option<String>), Vec<&JobRecord>> =
            BTreeMap::new();
        for r in state.records.values() {
            if scope.created_after.is_some_and(|t| r.created_at < t) {
                continue;
            }
            let key = match dimension {
                Dimension::Global => (None, None),
                Dimension::Server => (r.server_name.clone(), None),
                Dimension::Queue => (Some(r.queue.clone()), Some(r.connection.clone())),
                Dimension::JobClass => (Some(r.job_class.clone()), None),
            };
            if let Some(v) = &scope.value {
                if key.0.as_ref() != Some(v) {
                    continue;
                }
            }
            groups.entry(key).or_default().push(r);
        }

        if dimension == Dimension::Global && groups.is_empty() {
            return Ok(vec![AggregateRow::default()]);
        }

        let mut rows: Vec<AggregateRow> = groups
            .into_iter()
            .map(|((key, connection), records)| summarize(key, connection, &records))
            .collect();
        if dimension == Dimension::JobClass {
            rows.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.key.cmp(&b.key)));
        }
        Ok(rows)
    }

    async fn failure_patterns(&self, limit: i64) -> Result<Vec<FailurePattern>> {
        self.check()?;
        let state = self.state.lock();
        let mut by_class: HashMap<&str, (i64, HashSet<&str>)> = HashMap::new();
        for r in state.records.values().filter(|r| r.is_failed()) {
            if let Some(e) = &r.exception {
                let entry = by_class.entry(e.class.as_str()).or_default();
                entry.0 += 1;
                entry.1.insert(r.job_class.as_str());
            }
        }
        let mut patterns: Vec<FailurePattern> = by_class
            .into_iter()
            .map(|(class, (count, classes))| FailurePattern {
                exception_class: class.to_string(),
                count,
                affected_job_classes: classes.len() as i64,
            })
            .collect();
        patterns.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.exception_class.cmp(&b.exception_class))
        });
        patterns.truncate(limit.max(0) as usize);
        Ok(patterns)
    }

    async fn metric_samples(&self, filter: &JobFilter) -> Result<Vec<MetricSample>> {
        self.check()?;
        let state = self.state.lock();
        Ok(state
            .matching(filter)
            .into_iter()
            .map(|r| MetricSample {
                job_class: r.job_class.clone(),
                queue: r.queue.clone(),
                status: r.status,
                duration_ms: r.duration_ms,
                queued_at: r.queued_at,
                completed_at: r.completed_at,
            })
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}

fn summarize(key: Option<String>, connection: Option<String>, records: &[&JobRecord]) -> AggregateRow {
    let mut row = AggregateRow {
        key,
        connection,
        total: records.len() as i64,
        ..AggregateRow::default()
    };
    for r in records {
        match r.status {
            JobStatus::Queued => row.queued += 1,
            JobStatus::Processing => row.processing += 1,
            JobStatus::Completed => row.completed += 1,
            JobStatus::Failed => row.failed += 1,
            JobStatus::Timeout => row.timeout += 1,
            JobStatus::Cancelled => row.cancelled += 1,
        }
    }

    let durations: Vec<i64> = records.iter().filter_map(|r| r.duration_ms).collect();
    if !durations.is_empty() {
        row.avg_duration_ms = Some(durations.iter().sum::<i64>() as f64 / durations.len() as f64);
        row.max_duration_ms = durations.iter().copied().max();
    }

    let memory: Vec<f64> = records.iter().filter_map(|r| r.memory_peak_mb).collect();
    if !memory.is_empty() {
        row.avg_memory_mb = Some(memory.iter().sum::<f64>() / memory.len() as f64);
        row.max_memory_mb = memory.iter().copied().reduce(f64::max);
    }
    row
}

fn percentage(part: i64, total: i64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (part as f64 / total as f64 * 10_000.0).round() / 100.0
}
