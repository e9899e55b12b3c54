//! Pure decision logic for the lifecycle state machine.
//!
//! Stores call into these functions while holding whatever lock makes the
//! read-decide-write sequence atomic, so nothing here touches storage.

use chrono::{DateTime, Utc};

use crate::jobs::model::{ExceptionInfo, JobPatch, JobRecord, JobStatus, NewJobRecord};
use crate::jobs::store::StartTransition;

/// Statuses a finishing notification may move out of.
pub const FINISHABLE: [JobStatus; 1] = [JobStatus::Processing];

/// Statuses an operator cancel may move out of.
pub const CANCELLABLE: [JobStatus; 2] = [JobStatus::Queued, JobStatus::Processing];

#[derive(Debug, Clone, PartialEq)]
pub enum StartPlan {
    Ignore,
    Advance { id: i64, patch: JobPatch },
    Synthesize { record: NewJobRecord },
    Retry { record: NewJobRecord },
}

/// Decides what a Start notification does.
///
/// `existing` is the latest attempt found by transport id, or failing that by
/// uuid. The transport's attempt counter is authoritative: a counter above the
/// stored attempt means a new delivery of a job we already saw running.
pub fn plan_start(existing: Option<&JobRecord>, start: &StartTransition) -> StartPlan {
    let attempt = start.attempts.max(1);

    let Some(current) = existing else {
        let mut record = start.enqueue.clone();
        record.job_id = Some(start.job_id.clone());
        record.status = JobStatus::Processing;
        record.attempt = attempt;
        record.worker = start.worker.clone();
        record.queued_at = record.queued_at.or(Some(start.started_at));
        record.started_at = Some(start.started_at);
        return StartPlan::Synthesize { record };
    };

    if current.status == JobStatus::Queued {
        let patch = JobPatch {
            job_id: Some(start.job_id.clone()),
            status: Some(JobStatus::Processing),
            attempt: Some(attempt.max(current.attempt)),
            started_at: Some(start.started_at),
            ..JobPatch::default()
        }
        .with_worker(&start.worker);
        return StartPlan::Advance {
            id: current.id,
            patch,
        };
    }

    if attempt > current.attempt {
        let record = NewJobRecord {
            uuid: current.uuid.clone(),
            job_id: Some(start.job_id.clone()),
            job_class: current.job_class.clone(),
            display_name: current.display_name.clone(),
            connection: current.connection.clone(),
            queue: current.queue.clone(),
            payload: current.payload.clone(),
            status: JobStatus::Processing,
            attempt,
            max_attempts: current.max_attempts,
            retried_from_id: Some(current.id),
            worker: start.worker.clone(),
            tags: current.tags.clone(),
            queued_at: Some(start.started_at),
            started_at: Some(start.started_at),
        };
        return StartPlan::Retry { record };
    }

    StartPlan::Ignore
}

/// Milliseconds between start and finish, clamped at zero.
pub fn duration_ms(started_at: Option<DateTime<Utc>>, finished_at: DateTime<Utc>) -> Option<i64> {
    started_at.map(|s| (finished_at - s).num_milliseconds().max(0))
}

/// Resource readings reported with a successful finish.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    pub memory_peak_mb: Option<f64>,
    pub cpu_time_ms: Option<f64>,
    pub file_descriptors: Option<i32>,
}

pub fn completion_patch(
    record: &JobRecord,
    usage: ResourceUsage,
    now: DateTime<Utc>,
) -> JobPatch {
    JobPatch {
        status: Some(JobStatus::Completed),
        completed_at: Some(now),
        duration_ms: duration_ms(record.started_at, now),
        memory_peak_mb: usage.memory_peak_mb,
        cpu_time_ms: usage.cpu_time_ms,
        file_descriptors: usage.file_descriptors,
        ..JobPatch::default()
    }
}

pub fn failure_patch(
    record: &JobRecord,
    status: JobStatus,
    exception: ExceptionInfo,
    now: DateTime<Utc>,
) -> JobPatch {
    JobPatch {
        status: Some(status),
        completed_at: Some(now),
        duration_ms: duration_ms(record.started_at, now),
        exception: Some(exception),
        ..JobPatch::default()
    }
}

pub fn cancel_patch(now: DateTime<Utc>) -> JobPatch {
    JobPatch {
        status: Some(JobStatus::Cancelled),
        completed_at: Some(now),
        ..JobPatch::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::model::WorkerType;
    use crate::jobs::worker_context::WorkerContext;
    use chrono::Duration;

    fn record(status: JobStatus, attempt: i32) -> JobRecord {
        let now = Utc::now();
        JobRecord {
            id: 7,
            uuid: "u-1".into(),
            job_id: Some("42".into()),
            job_class: "App\\Jobs\\SendMail".into(),
            display_name: None,
            connection: "redis".into(),
            queue: "default".into(),
            payload: None,
            status,
            attempt,
            max_attempts: 3,
            retried_from_id: None,
            server_name: None,
            worker_id: None,
            worker_type: WorkerType::QueueWork,
            cpu_time_ms: None,
            memory_peak_mb: None,
            file_descriptors: None,
            duration_ms: None,
            exception: None,
            tags: None,
            queued_at: Some(now),
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn start(attempts: i32) -> StartTransition {
        let worker = WorkerContext::new("host", "worker-1", WorkerType::QueueWork);
        StartTransition {
            job_id: "42".into(),
            attempts,
            enqueue: NewJobRecord {
                uuid: "u-1".into(),
                job_id: None,
                job_class: "App\\Jobs\\SendMail".into(),
                display_name: None,
                connection: "redis".into(),
                queue: "default".into(),
                payload: None,
                status: JobStatus::Queued,
                attempt: 1,
                max_attempts: 3,
                retried_from_id: None,
                worker: worker.clone(),
                tags: None,
                queued_at: None,
                started_at: None,
            },
            worker,
            started_at: Utc::now(),
        }
    }

    #[test]
    fn queued_record_advances() {
        let r = record(JobStatus::Queued, 1);
        match plan_start(Some(&r), &start(1)) {
            StartPlan::Advance { id, patch } => {
                assert_eq!(id, 7);
                assert_eq!(patch.status, Some(JobStatus::Processing));
                assert_eq!(patch.job_id.as_deref(), Some("42"));
                assert_eq!(patch.worker_id.as_deref(), Some("worker-1"));
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn duplicate_start_is_ignored() {
        let r = record(JobStatus::Processing, 1);
        assert_eq!(plan_start(Some(&r), &start(1)), StartPlan::Ignore);
    }

    #[test]
    fn higher_attempt_opens_linked_record() {
        let r = record(JobStatus::Failed, 1);
        match plan_start(Some(&r), &start(2)) {
            StartPlan::Retry { record } => {
                assert_eq!(record.retried_from_id, Some(7));
                assert_eq!(record.attempt, 2);
                assert_eq!(record.uuid, "u-1");
                assert_eq!(record.status, JobStatus::Processing);
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn unknown_job_is_synthesized_as_processing() {
        match plan_start(None, &start(1)) {
            StartPlan::Synthesize { record } => {
                assert_eq!(record.status, JobStatus::Processing);
                assert_eq!(record.job_id.as_deref(), Some("42"));
                assert!(record.started_at.is_some());
            }
            other => panic!("unexpected plan {other:?}"),
        }
    }

    #[test]
    fn duration_never_negative() {
        let now = Utc::now();
        assert_eq!(duration_ms(Some(now + Duration::seconds(5)), now), Some(0));
        assert_eq!(duration_ms(Some(now - Duration::milliseconds(1500)), now), Some(1500));
        assert_eq!(duration_ms(None, now), None);
    }
}
