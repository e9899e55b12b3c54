use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use crate::config::MonitorConfig;
use crate::error::{MonitorError, Result};
use crate::jobs::events::{EventSink, MonitorEvent, NoopEvents};
use crate::jobs::model::{ExceptionInfo, JobPatch, JobRecord, JobStatus, NewJobRecord};
use crate::jobs::notifications::{JobNotification, QueuedJob};
use crate::jobs::payload;
use crate::jobs::store::{JobStore, StartAction, StartOutcome, StartTransition};
use crate::jobs::tags::{self, DeferredTagWriter, ImmediateTagWriter, TagWriter};
use crate::jobs::transitions::{self, ResourceUsage, CANCELLABLE, FINISHABLE};
use crate::jobs::worker_context::WorkerContext;

/// Receives failures from the fire-and-forget notification path.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, operation: &str, error: &MonitorError);
}

/// Logs through `tracing`.
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, operation: &str, error: &MonitorError) {
        tracing::error!(operation, error = %error, "job lifecycle tracking failed");
    }
}

/// Applies lifecycle notifications to the store.
///
/// `record_*` methods return errors to the caller. `handle` and `dispatch`
/// are the entry points for the queue transport: they never fail, and hand
/// errors to the [`ErrorReporter`] instead.
#[derive(Clone)]
pub struct LifecycleTracker {
    store: Arc<dyn JobStore>,
    tags: Arc<dyn TagWriter>,
    events: Arc<dyn EventSink>,
    reporter: Arc<dyn ErrorReporter>,
    config: Arc<MonitorConfig>,
}

impl LifecycleTracker {
    /// Tag writes are deferred when configured, which spawns a task and so
    /// needs a tokio runtime.
    pub fn new(store: Arc<dyn JobStore>, config: Arc<MonitorConfig>) -> Self {
        let tags: Arc<dyn TagWriter> = if config.storage.deferred_tags {
            Arc::new(DeferredTagWriter::spawn(store.clone()))
        } else {
            Arc::new(ImmediateTagWriter::new(store.clone()))
        };
        Self {
            store,
            tags,
            events: Arc::new(NoopEvents),
            reporter: Arc::new(TracingReporter),
            config,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_tag_writer(mut self, tags: Arc<dyn TagWriter>) -> Self {
        self.tags = tags;
        self
    }

    /// Handles one notification, reporting instead of returning errors.
    pub async fn handle(&self, notification: JobNotification) {
        if !self.config.enabled {
            return;
        }
        let kind = notification.kind();
        let result = match notification {
            JobNotification::Enqueued { job, worker } => {
                self.record_enqueued(&job, &worker).await.map(drop)
            }
            JobNotification::Started {
                job_id,
                attempts,
                job,
                worker,
            } => self
                .record_started(&job_id, attempts, &job, &worker)
                .await
                .map(drop),
            JobNotification::Completed {
                job_id,
                memory_peak_mb,
                cpu_time_ms,
                file_descriptors,
                tags,
            } => {
                let usage = ResourceUsage {
                    memory_peak_mb,
                    cpu_time_ms,
                    file_descriptors,
                };
                self.record_completed(&job_id, usage, &tags).await.map(drop)
            }
            JobNotification::Failed {
                job_id,
                exception,
                tags,
            } => self.record_failed(&job_id, exception, &tags).await.map(drop),
            JobNotification::TimedOut { job_id, tags } => {
                self.record_timed_out(&job_id, &tags).await.map(drop)
            }
        };
        if let Err(e) = result {
            self.reporter.report(kind, &e);
        }
    }

    /// Spawns [`handle`](Self::handle) so the caller never waits on storage.
    pub fn dispatch(&self, notification: JobNotification) -> JoinHandle<()> {
        let tracker = self.clone();
        tokio::spawn(async move { tracker.handle(notification).await })
    }

    /// Creates the queued record for a job, or returns the existing one.
    pub async fn record_enqueued(
        &self,
        job: &QueuedJob,
        worker: &WorkerContext,
    ) -> Result<JobRecord> {
        self.ensure_enabled()?;
        let record = self.enqueue_record(job, worker, Utc::now());

        let outcome = self.store.record_enqueue(record).await?;
        if !outcome.created {
            tracing::debug!(uuid = %outcome.record.uuid, "enqueue already recorded");
            return Ok(outcome.record);
        }

        let created = outcome.record;
        tracing::debug!(uuid = %created.uuid, queue = %created.queue, "job enqueued");
        self.events.publish(MonitorEvent::JobRecorded {
            record: created.clone(),
        });
        Ok(created)
    }

    pub async fn record_started(
        &self,
        job_id: &str,
        attempts: i32,
        job: &QueuedJob,
        worker: &WorkerContext,
    ) -> Result<StartOutcome> {
        self.ensure_enabled()?;
        let now = Utc::now();
        let start = StartTransition {
            job_id: job_id.to_string(),
            attempts,
            enqueue: self.enqueue_record(job, worker, now),
            worker: worker.clone(),
            started_at: now,
        };

        let outcome = self.store.record_start(start).await?;
        let record = &outcome.record;
        match outcome.action {
            StartAction::Advanced => {
                tracing::debug!(uuid = %record.uuid, job_id, attempt = record.attempt, "job started");
            }
            StartAction::Synthesized => {
                tracing::info!(uuid = %record.uuid, job_id, "start without enqueue, record synthesized");
                self.events.publish(MonitorEvent::JobRecorded {
                    record: record.clone(),
                });
            }
            StartAction::Retried => {
                tracing::info!(
                    uuid = %record.uuid,
                    job_id,
                    attempt = record.attempt,
                    retried_from_id = ?record.retried_from_id,
                    "retry attempt recorded"
                );
            }
            StartAction::Duplicate => {
                tracing::debug!(uuid = %record.uuid, job_id, "duplicate start ignored");
            }
        }
        Ok(outcome)
    }

    pub async fn record_completed(
        &self,
        job_id: &str,
        usage: ResourceUsage,
        tags: &[String],
    ) -> Result<Option<JobRecord>> {
        self.finish(job_id, tags, |record, now| {
            transitions::completion_patch(record, usage, now)
        })
        .await
    }

    pub async fn record_failed(
        &self,
        job_id: &str,
        exception: ExceptionInfo,
        tags: &[String],
    ) -> Result<Option<JobRecord>> {
        self.finish(job_id, tags, |record, now| {
            transitions::failure_patch(record, JobStatus::Failed, exception, now)
        })
        .await
    }

    pub async fn record_timed_out(
        &self,
        job_id: &str,
        tags: &[String],
    ) -> Result<Option<JobRecord>> {
        self.finish(job_id, tags, |record, now| {
            transitions::failure_patch(record, JobStatus::Timeout, ExceptionInfo::timeout(), now)
        })
        .await
    }

    /// Operator cancel of the latest attempt of `uuid`.
    pub async fn cancel(&self, uuid: &str) -> Result<JobRecord> {
        self.ensure_enabled()?;
        let record = self
            .store
            .find_by_uuid(uuid)
            .await?
            .ok_or_else(|| MonitorError::NotFound(uuid.to_string()))?;

        let invalid = |from: JobStatus| MonitorError::InvalidTransition {
            uuid: uuid.to_string(),
            from,
            to: JobStatus::Cancelled,
        };
        if !record.status.can_transition_to(JobStatus::Cancelled) {
            return Err(invalid(record.status));
        }

        let cancelled = match self
            .store
            .transition(record.id, &CANCELLABLE, transitions::cancel_patch(Utc::now()))
            .await?
        {
            Some(r) => r,
            None => {
                let current = self
                    .store
                    .find_by_id(record.id)
                    .await?
                    .ok_or_else(|| MonitorError::NotFound(uuid.to_string()))?;
                return Err(invalid(current.status));
            }
        };

        tracing::info!(uuid, "job cancelled");
        self.events.publish(MonitorEvent::JobCancelled {
            record: cancelled.clone(),
        });
        Ok(cancelled)
    }

    async fn finish<F>(&self, job_id: &str, extra_tags: &[String], build: F) -> Result<Option<JobRecord>>
    where
        F: FnOnce(&JobRecord, DateTime<Utc>) -> JobPatch + Send,
    {
        self.ensure_enabled()?;
        let Some(record) = self.store.find_by_job_id(job_id).await? else {
            tracing::debug!(job_id, "finish for unknown job ignored");
            return Ok(None);
        };
        if !FINISHABLE.contains(&record.status) {
            tracing::debug!(job_id, status = %record.status, "finish for job not processing ignored");
            return Ok(None);
        }

        let mut declared = record.tags.clone().unwrap_or_default();
        declared.extend(extra_tags.iter().cloned());
        let declared = tags::normalize(&declared);

        let mut patch = build(&record, Utc::now());
        if !declared.is_empty() && record.tags.as_ref() != Some(&declared) {
            patch.tags = Some(declared.clone());
        }

        let Some(updated) = self.store.transition(record.id, &FINISHABLE, patch).await? else {
            tracing::debug!(job_id, "job finished concurrently, update skipped");
            return Ok(None);
        };

        self.tags.write(updated.id, declared).await?;

        tracing::debug!(
            uuid = %updated.uuid,
            job_id,
            status = %updated.status,
            duration_ms = ?updated.duration_ms,
            "job finished"
        );
        Ok(Some(updated))
    }

    fn enqueue_record(
        &self,
        job: &QueuedJob,
        worker: &WorkerContext,
        now: DateTime<Utc>,
    ) -> NewJobRecord {
        let tags = tags::normalize(&job.tags);
        NewJobRecord {
            uuid: job
                .uuid
                .clone()
                .filter(|u| !u.trim().is_empty())
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            job_id: None,
            job_class: job.job_class_or_unknown(),
            display_name: job.display_name.clone(),
            connection: job.connection_or_default(),
            queue: job.queue_or_default(),
            payload: payload::prepare(job.payload.as_ref(), &self.config.storage),
            status: JobStatus::Queued,
            attempt: 1,
            max_attempts: job.max_attempts.unwrap_or(1).max(1),
            retried_from_id: None,
            worker: worker.clone(),
            tags: (!tags.is_empty()).then_some(tags),
            queued_at: Some(now),
            started_at: None,
        }
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.config.enabled {
            Ok(())
        } else {
            Err(MonitorError::Disabled)
        }
    }
}
