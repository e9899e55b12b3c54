use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jobs::worker_context::WorkerContext;

/// Lifecycle status of one job attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Queued,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Timeout,
        JobStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Timeout => "timeout",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            "timeout" => Some(JobStatus::Timeout),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            JobStatus::Queued => "Queued",
            JobStatus::Processing => "Processing",
            JobStatus::Completed => "Completed",
            JobStatus::Failed => "Failed",
            JobStatus::Timeout => "Timeout",
            JobStatus::Cancelled => "Cancelled",
        }
    }

    pub fn color(&self) -> &'static str {
        match self {
            JobStatus::Queued => "gray",
            JobStatus::Processing => "blue",
            JobStatus::Completed => "green",
            JobStatus::Failed => "red",
            JobStatus::Timeout => "orange",
            JobStatus::Cancelled => "yellow",
        }
    }

    /// Terminal states. Nothing moves out of them.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Timeout | JobStatus::Cancelled
        )
    }

    pub fn is_successful(&self) -> bool {
        matches!(self, JobStatus::Completed)
    }

    /// Failed and timed-out attempts both count as failures.
    pub fn is_failed(&self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Timeout)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        match self {
            JobStatus::Queued => matches!(next, JobStatus::Processing | JobStatus::Cancelled),
            JobStatus::Processing => matches!(
                next,
                JobStatus::Completed | JobStatus::Failed | JobStatus::Timeout | JobStatus::Cancelled
            ),
            JobStatus::Completed | JobStatus::Failed | JobStatus::Timeout | JobStatus::Cancelled => {
                false
            }
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of process that ran the attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerType {
    /// Plain long-running queue worker.
    #[default]
    QueueWork,
    /// Worker owned by a managed supervisor.
    Horizon,
}

impl WorkerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerType::QueueWork => "queue_work",
            WorkerType::Horizon => "horizon",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "queue_work" => Some(WorkerType::QueueWork),
            "horizon" => Some(WorkerType::Horizon),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WorkerType::QueueWork => "Queue Worker",
            WorkerType::Horizon => "Horizon",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            WorkerType::QueueWork => "terminal",
            WorkerType::Horizon => "server",
        }
    }
}

impl fmt::Display for WorkerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class, message and trace of the error that ended an attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExceptionInfo {
    pub class: String,
    pub message: String,
    #[serde(default)]
    pub trace: String,
}

impl ExceptionInfo {
    pub fn new(class: impl Into<String>, message: impl Into<String>, trace: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
            trace: trace.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new("JobTimeout", "Job exceeded maximum execution time", "")
    }
}

/// One persisted job attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: i64,
    pub uuid: String,
    pub job_id: Option<String>,
    pub job_class: String,
    pub display_name: Option<String>,
    pub connection: String,
    pub queue: String,
    pub payload: Option<Value>,

    pub status: JobStatus,
    pub attempt: i32,
    pub max_attempts: i32,
    pub retried_from_id: Option<i64>,

    pub server_name: Option<String>,
    pub worker_id: Option<String>,
    pub worker_type: WorkerType,

    pub cpu_time_ms: Option<f64>,
    pub memory_peak_mb: Option<f64>,
    pub file_descriptors: Option<i32>,
    pub duration_ms: Option<i64>,

    pub exception: Option<ExceptionInfo>,
    pub tags: Option<Vec<String>>,

    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn is_successful(&self) -> bool {
        self.status.is_successful()
    }

    pub fn is_failed(&self) -> bool {
        self.status.is_failed()
    }

    /// Class name without its namespace.
    pub fn short_job_class(&self) -> &str {
        self.job_class
            .rsplit(['\\', ':', '.'])
            .find(|s| !s.is_empty())
            .unwrap_or(&self.job_class)
    }

    pub fn display_label(&self) -> &str {
        match self.display_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => self.short_job_class(),
        }
    }

    pub fn formatted_duration(&self) -> Option<String> {
        self.duration_ms.map(format_duration_ms)
    }

    pub fn worker_identifier(&self) -> Option<String> {
        match (&self.server_name, &self.worker_id) {
            (Some(server), Some(worker)) => Some(format!("{server}:{worker}")),
            _ => None,
        }
    }
}

pub fn format_duration_ms(ms: i64) -> String {
    if ms < 1000 {
        format!("{ms}ms")
    } else if ms < 60_000 {
        format!("{:.2}s", ms as f64 / 1000.0)
    } else {
        let secs = ms / 1000;
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Input for inserting a new attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJobRecord {
    pub uuid: String,
    pub job_id: Option<String>,
    pub job_class: String,
    pub display_name: Option<String>,
    pub connection: String,
    pub queue: String,
    pub payload: Option<Value>,
    pub status: JobStatus,
    pub attempt: i32,
    pub max_attempts: i32,
    pub retried_from_id: Option<i64>,
    pub worker: WorkerContext,
    pub tags: Option<Vec<String>>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Partial update. `None` leaves the stored value alone.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobPatch {
    pub job_id: Option<String>,
    pub status: Option<JobStatus>,
    pub attempt: Option<i32>,
    pub server_name: Option<String>,
    pub worker_id: Option<String>,
    pub worker_type: Option<WorkerType>,
    pub cpu_time_ms: Option<f64>,
    pub memory_peak_mb: Option<f64>,
    pub file_descriptors: Option<i32>,
    pub duration_ms: Option<i64>,
    pub exception: Option<ExceptionInfo>,
    pub tags: Option<Vec<String>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobPatch {
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_worker(mut self, worker: &WorkerContext) -> Self {
        self.server_name = Some(worker.server_name.clone());
        self.worker_id = Some(worker.worker_id.clone());
        self.worker_type = Some(worker.worker_type);
        self
    }

    /// Applies the set fields to an in-memory record.
    pub fn apply_to(&self, record: &mut JobRecord, now: DateTime<Utc>) {
        if let Some(v) = &self.job_id {
            record.job_id = Some(v.clone());
        }
        if let Some(v) = self.status {
            record.status = v;
        }
        if let Some(v) = self.attempt {
            record.attempt = v;
        }
        if let Some(v) = &self.server_name {
            record.server_name = Some(v.clone());
        }
        if let Some(v) = &self.worker_id {
            record.worker_id = Some(v.clone());
        }
        if let Some(v) = self.worker_type {
            record.worker_type = v;
        }
        if let Some(v) = self.cpu_time_ms {
            record.cpu_time_ms = Some(v);
        }
        if let Some(v) = self.memory_peak_mb {
            record.memory_peak_mb = Some(v);
        }
        if let Some(v) = self.file_descriptors {
            record.file_descriptors = Some(v);
        }
        if let Some(v) = self.duration_ms {
            record.duration_ms = Some(v);
        }
        if let Some(v) = &self.exception {
            record.exception = Some(v.clone());
        }
        if let Some(v) = &self.tags {
            record.tags = Some(v.clone());
        }
        if let Some(v) = self.started_at {
            record.started_at = Some(v);
        }
        if let Some(v) = self.completed_at {
            record.completed_at = Some(v);
        }
        record.updated_at = now;
    }
}

/// Result of a replay dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub original_uuid: String,
    pub new_uuid: String,
    pub new_job_id: Option<String>,
    pub queue: String,
    pub connection: String,
    pub replayed_at: DateTime<Utc>,
}
