use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::jobs::model::ExceptionInfo;
use crate::jobs::worker_context::WorkerContext;

/// Job metadata as the queue transport knows it at enqueue time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueuedJob {
    pub uuid: Option<String>,
    pub job_class: Option<String>,
    pub display_name: Option<String>,
    pub connection: Option<String>,
    pub queue: Option<String>,
    pub payload: Option<Value>,
    pub max_attempts: Option<i32>,
    pub tags: Vec<String>,
}

impl QueuedJob {
    pub fn new(uuid: impl Into<String>, job_class: impl Into<String>) -> Self {
        Self {
            uuid: Some(uuid.into()),
            job_class: Some(job_class.into()),
            ..Self::default()
        }
    }

    pub fn on(mut self, connection: impl Into<String>, queue: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self.queue = Some(queue.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn connection_or_default(&self) -> String {
        self.connection.clone().unwrap_or_else(|| "default".to_string())
    }

    pub fn queue_or_default(&self) -> String {
        self.queue.clone().unwrap_or_else(|| "default".to_string())
    }

    pub fn job_class_or_unknown(&self) -> String {
        self.job_class.clone().unwrap_or_else(|| "Unknown".to_string())
    }
}

/// Lifecycle signals emitted by the queue transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JobNotification {
    Enqueued {
        job: QueuedJob,
        #[serde(default)]
        worker: WorkerContext,
    },
    Started {
        job_id: String,
        attempts: i32,
        #[serde(default)]
        job: QueuedJob,
        #[serde(default)]
        worker: WorkerContext,
    },
    Completed {
        job_id: String,
        #[serde(default)]
        memory_peak_mb: Option<f64>,
        #[serde(default)]
        cpu_time_ms: Option<f64>,
        #[serde(default)]
        file_descriptors: Option<i32>,
        #[serde(default)]
        tags: Vec<String>,
    },
    Failed {
        job_id: String,
        exception: ExceptionInfo,
        #[serde(default)]
        tags: Vec<String>,
    },
    TimedOut {
        job_id: String,
        #[serde(default)]
        tags: Vec<String>,
    },
}

impl JobNotification {
    pub fn kind(&self) -> &'static str {
        match self {
            JobNotification::Enqueued { .. } => "enqueued",
            JobNotification::Started { .. } => "started",
            JobNotification::Completed { .. } => "completed",
            JobNotification::Failed { .. } => "failed",
            JobNotification::TimedOut { .. } => "timed_out",
        }
    }
}
