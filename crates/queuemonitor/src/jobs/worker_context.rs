use serde::{Deserialize, Serialize};

use crate::jobs::model::WorkerType;

/// Identity of the process reporting a lifecycle notification.
///
/// Captured once at worker startup with [`WorkerContext::detect`] and passed
/// along with every notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerContext {
    pub server_name: String,
    pub worker_id: String,
    #[serde(default)]
    pub worker_type: WorkerType,
}

impl WorkerContext {
    pub fn new(
        server_name: impl Into<String>,
        worker_id: impl Into<String>,
        worker_type: WorkerType,
    ) -> Self {
        Self {
            server_name: server_name.into(),
            worker_id: worker_id.into(),
            worker_type,
        }
    }

    /// Builds the context for the current process.
    ///
    /// A supervisor name in `QUEUE_MONITOR_SUPERVISOR` marks a supervised
    /// worker; otherwise the worker id is derived from the process id.
    pub fn detect() -> Self {
        let server_name = std::env::var("QUEUE_MONITOR_SERVER_NAME")
            .ok()
            .or_else(|| std::env::var("HOSTNAME").ok())
            .or_else(|| std::env::var("COMPUTERNAME").ok())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "unknown".to_string());

        match std::env::var("QUEUE_MONITOR_SUPERVISOR")
            .ok()
            .filter(|s| !s.trim().is_empty())
        {
            Some(supervisor) => Self::new(server_name, supervisor, WorkerType::Horizon),
            None => Self::new(
                server_name,
                format!("worker-{}", std::process::id()),
                WorkerType::QueueWork,
            ),
        }
    }

    pub fn unique_identifier(&self) -> String {
        format!("{}:{}", self.server_name, self.worker_id)
    }
}

impl Default for WorkerContext {
    fn default() -> Self {
        Self::new("unknown", "unknown", WorkerType::QueueWork)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_joins_server_and_worker() {
        let ctx = WorkerContext::new("web-1", "worker-42", WorkerType::QueueWork);
        assert_eq!(ctx.unique_identifier(), "web-1:worker-42");
    }
}
