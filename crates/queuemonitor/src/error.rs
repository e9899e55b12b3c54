use thiserror::Error;

use crate::jobs::model::JobStatus;

pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("job not found: {0}")]
    NotFound(String),

    #[error("job {uuid} is {status} and cannot be replayed")]
    InvalidState { uuid: String, status: JobStatus },

    #[error("cannot move job {uuid} from {from} to {to}")]
    InvalidTransition {
        uuid: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("payload not stored for job {0}")]
    PayloadUnavailable(String),

    #[error("job class {0} is not available")]
    ClassUnavailable(String),

    #[error("stored payload for job {0} is not a valid job payload")]
    InvalidPayload(String),

    #[error("queue monitor is disabled")]
    Disabled,

    #[error("dispatch failed: {0}")]
    Dispatch(#[source] anyhow::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl MonitorError {
    /// True for errors caused by the request rather than the system.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            MonitorError::NotFound(_)
                | MonitorError::InvalidState { .. }
                | MonitorError::InvalidTransition { .. }
                | MonitorError::PayloadUnavailable(_)
                | MonitorError::ClassUnavailable(_)
                | MonitorError::InvalidPayload(_)
        )
    }
}
