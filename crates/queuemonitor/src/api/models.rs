use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::performance::{DailyErrorRate, DurationBucket, Percentiles, QueueThroughput, Regression};
use crate::jobs::filter::{JobFilter, SortColumn, SortDirection};
use crate::jobs::model::{JobRecord, JobStatus, WorkerType};
use crate::replay::BatchTarget;

/// Row of the job listing. Payload and trace stay on the detail endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobListItem {
    pub id: i64,
    pub uuid: String,
    pub job_id: Option<String>,
    pub job_class: String,
    pub display_name: String,
    pub connection: String,
    pub queue: String,
    pub status: JobStatus,
    pub attempt: i32,
    pub max_attempts: i32,
    pub retried_from_id: Option<i64>,
    pub server_name: Option<String>,
    pub worker_type: WorkerType,
    pub duration_ms: Option<i64>,
    pub duration: Option<String>,
    pub memory_peak_mb: Option<f64>,
    pub exception_class: Option<String>,
    pub exception_message: Option<String>,
    pub tags: Option<Vec<String>>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&JobRecord> for JobListItem {
    fn from(r: &JobRecord) -> Self {
        Self {
            id: r.id,
            uuid: r.uuid.clone(),
            job_id: r.job_id.clone(),
            job_class: r.job_class.clone(),
            display_name: r.display_label().to_string(),
            connection: r.connection.clone(),
            queue: r.queue.clone(),
            status: r.status,
            attempt: r.attempt,
            max_attempts: r.max_attempts,
            retried_from_id: r.retried_from_id,
            server_name: r.server_name.clone(),
            worker_type: r.worker_type,
            duration_ms: r.duration_ms,
            duration: r.formatted_duration(),
            memory_peak_mb: r.memory_peak_mb,
            exception_class: r.exception.as_ref().map(|e| e.class.clone()),
            exception_message: r.exception.as_ref().map(|e| e.message.clone()),
            tags: r.tags.clone(),
            queued_at: r.queued_at,
            started_at: r.started_at,
            completed_at: r.completed_at,
        }
    }
}

/// Query string of the listing and export endpoints. Multi-valued fields
/// are comma separated.
#[derive(Debug, Default, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
    pub queue: Option<String>,
    pub connection: Option<String>,
    pub job_class: Option<String>,
    pub server_name: Option<String>,
    pub worker_id: Option<String>,
    pub worker_type: Option<String>,
    pub tags: Option<String>,
    pub queued_after: Option<DateTime<Utc>>,
    pub queued_before: Option<DateTime<Utc>>,
    pub started_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
    pub completed_after: Option<DateTime<Utc>>,
    pub completed_before: Option<DateTime<Utc>>,
    pub min_duration_ms: Option<i64>,
    pub max_duration_ms: Option<i64>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_direction: Option<String>,
}

impl ListJobsQuery {
    pub fn into_filter(self) -> JobFilter {
        let mut f = JobFilter::new();
        f.statuses = split(self.status.as_deref())
            .iter()
            .filter_map(|s| JobStatus::parse(s))
            .collect();
        f.queues = split(self.queue.as_deref());
        f.connection = self.connection;
        f.job_classes = split(self.job_class.as_deref());
        f.server_names = split(self.server_name.as_deref());
        f.worker_id = self.worker_id;
        f.worker_type = self.worker_type.as_deref().and_then(WorkerType::parse);
        f.tags = split(self.tags.as_deref());
        f.queued_after = self.queued_after;
        f.queued_before = self.queued_before;
        f.started_after = self.started_after;
        f.started_before = self.started_before;
        f.completed_after = self.completed_after;
        f.completed_before = self.completed_before;
        f.min_duration_ms = self.min_duration_ms;
        f.max_duration_ms = self.max_duration_ms;
        f.search = self.search;
        if let Some(limit) = self.limit {
            f.limit = limit;
        }
        f.offset = self.offset.unwrap_or(0);
        f.sort_by = self
            .sort_by
            .as_deref()
            .map(SortColumn::parse)
            .unwrap_or_default();
        f.sort_direction = self
            .sort_direction
            .as_deref()
            .map(SortDirection::parse)
            .unwrap_or_default();
        f
    }
}

fn split(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Serialize)]
pub struct ListJobsResponse {
    pub items: Vec<JobListItem>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Body of the batch endpoints. `uuids` wins over `filter`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BatchRequest {
    pub uuids: Option<Vec<String>>,
    pub filter: Option<JobFilter>,
    pub max_items: Option<usize>,
}

impl BatchRequest {
    pub fn into_target(self) -> Option<BatchTarget> {
        match (self.uuids, self.filter) {
            (Some(uuids), _) => Some(BatchTarget::Uuids(uuids)),
            (None, Some(filter)) => Some(BatchTarget::Filter {
                filter,
                max_items: self.max_items,
            }),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    pub server: Option<String>,
    pub queue: Option<String>,
    pub job_class: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PerformanceQuery {
    pub since: Option<DateTime<Utc>>,
    pub hours: Option<i64>,
    pub days: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct PerformanceReport {
    pub percentiles: BTreeMap<String, Percentiles>,
    pub distribution: Vec<DurationBucket>,
    pub regressions: Vec<Regression>,
    pub throughput: Vec<QueueThroughput>,
    pub error_rate_trend: Vec<DailyErrorRate>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FailedReportQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PruneRequest {
    pub days: Option<i64>,
    pub statuses: Option<Vec<JobStatus>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PruneResponse {
    pub deleted: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScoreResponse {
    pub score: u8,
}

#[derive(Debug, Serialize)]
pub struct AlertsResponse {
    pub requires_attention: bool,
    pub alerts: crate::analytics::Alerts,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_lists_are_comma_separated() {
        let q = ListJobsQuery {
            status: Some("failed, timeout,bogus".into()),
            queue: Some("emails,,reports".into()),
            limit: Some(10),
            ..ListJobsQuery::default()
        };
        let f = q.into_filter();
        assert_eq!(f.statuses, vec![JobStatus::Failed, JobStatus::Timeout]);
        assert_eq!(f.queues, vec!["emails".to_string(), "reports".to_string()]);
        assert_eq!(f.limit, 10);
    }

    #[test]
    fn batch_request_prefers_uuids() {
        let req = BatchRequest {
            uuids: Some(vec!["a".into()]),
            filter: Some(JobFilter::new()),
            max_items: None,
        };
        assert_eq!(req.into_target(), Some(BatchTarget::Uuids(vec!["a".into()])));
        assert_eq!(BatchRequest::default().into_target(), None);
    }
}
