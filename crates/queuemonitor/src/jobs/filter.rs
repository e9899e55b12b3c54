use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::model::{JobRecord, JobStatus, WorkerType};

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 1000;

/// Columns a listing may be ordered by. Anything else falls back to `queued_at`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortColumn {
    #[default]
    QueuedAt,
    StartedAt,
    CompletedAt,
    CreatedAt,
    DurationMs,
    Attempt,
    JobClass,
    Queue,
    Status,
}

impl SortColumn {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortColumn::QueuedAt => "queued_at",
            SortColumn::StartedAt => "started_at",
            SortColumn::CompletedAt => "completed_at",
            SortColumn::CreatedAt => "created_at",
            SortColumn::DurationMs => "duration_ms",
            SortColumn::Attempt => "attempt",
            SortColumn::JobClass => "job_class",
            SortColumn::Queue => "queue",
            SortColumn::Status => "status",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "started_at" => SortColumn::StartedAt,
            "completed_at" => SortColumn::CompletedAt,
            "created_at" => SortColumn::CreatedAt,
            "duration_ms" => SortColumn::DurationMs,
            "attempt" => SortColumn::Attempt,
            "job_class" => SortColumn::JobClass,
            "queue" => SortColumn::Queue,
            "status" => SortColumn::Status,
            _ => SortColumn::QueuedAt,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("asc") {
            SortDirection::Asc
        } else {
            SortDirection::Desc
        }
    }
}

/// Criteria for listing, counting and batch targeting.
///
/// Empty collections and `None` mean "no constraint". Time and duration
/// bounds are inclusive. Tags are AND-ed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobFilter {
    pub statuses: Vec<JobStatus>,
    pub queues: Vec<String>,
    pub connection: Option<String>,
    pub job_classes: Vec<String>,
    pub server_names: Vec<String>,
    pub worker_id: Option<String>,
    pub worker_type: Option<WorkerType>,
    pub tags: Vec<String>,
    pub queued_after: Option<DateTime<Utc>>,
    pub queued_before: Option<DateTime<Utc>>,
    pub started_after: Option<DateTime<Utc>>,
    pub started_before: Option<DateTime<Utc>>,
    pub completed_after: Option<DateTime<Utc>>,
    pub completed_before: Option<DateTime<Utc>>,
    pub min_duration_ms: Option<i64>,
    pub max_duration_ms: Option<i64>,
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
    pub sort_by: SortColumn,
    pub sort_direction: SortDirection,
}

impl Default for JobFilter {
    fn default() -> Self {
        Self {
            statuses: Vec::new(),
            queues: Vec::new(),
            connection: None,
            job_classes: Vec::new(),
            server_names: Vec::new(),
            worker_id: None,
            worker_type: None,
            tags: Vec::new(),
            queued_after: None,
            queued_before: None,
            started_after: None,
            started_before: None,
            completed_after: None,
            completed_before: None,
            min_duration_ms: None,
            max_duration_ms: None,
            search: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
            sort_by: SortColumn::default(),
            sort_direction: SortDirection::default(),
        }
    }
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = JobStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queues.push(queue.into());
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn sorted_by(mut self, column: SortColumn, direction: SortDirection) -> Self {
        self.sort_by = column;
        self.sort_direction = direction;
        self
    }

    pub fn effective_limit(&self) -> i64 {
        self.limit.clamp(1, MAX_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.max(0)
    }

    /// Trimmed search text, if any.
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    pub fn has_filters(&self) -> bool {
        !self.statuses.is_empty()
            || !self.queues.is_empty()
            || self.connection.is_some()
            || !self.job_classes.is_empty()
            || !self.server_names.is_empty()
            || self.worker_id.is_some()
            || self.worker_type.is_some()
            || !self.tags.is_empty()
            || self.queued_after.is_some()
            || self.queued_before.is_some()
            || self.started_after.is_some()
            || self.started_before.is_some()
            || self.completed_after.is_some()
            || self.completed_before.is_some()
            || self.min_duration_ms.is_some()
            || self.max_duration_ms.is_some()
            || self.search_term().is_some()
    }

    /// Predicate used by the in-memory store; mirrors the SQL built by the
    /// Postgres store.
    pub fn matches(&self, r: &JobRecord) -> bool {
        if !self.statuses.is_empty() && !self.statuses.contains(&r.status) {
            return false;
        }
        if !self.queues.is_empty() && !self.queues.iter().any(|q| q == &r.queue) {
            return false;
        }
        if let Some(c) = &self.connection {
            if c != &r.connection {
                return false;
            }
        }
        if !self.job_classes.is_empty() && !self.job_classes.iter().any(|c| c == &r.job_class) {
            return false;
        }
        if !self.server_names.is_empty() {
            match &r.server_name {
                Some(s) if self.server_names.contains(s) => {}
                _ => return false,
            }
        }
        if let Some(w) = &self.worker_id {
            if r.worker_id.as_ref() != Some(w) {
                return false;
            }
        }
        if let Some(t) = self.worker_type {
            if r.worker_type != t {
                return false;
            }
        }
        if !self.tags.is_empty() {
            let tags = r.tags.as_deref().unwrap_or_default();
            if !self.tags.iter().all(|t| tags.contains(t)) {
                return false;
            }
        }
        if !in_window(r.queued_at, self.queued_after, self.queued_before)
            || !in_window(r.started_at, self.started_after, self.started_before)
            || !in_window(r.completed_at, self.completed_after, self.completed_before)
        {
            return false;
        }
        if self.min_duration_ms.is_some() || self.max_duration_ms.is_some() {
            let Some(d) = r.duration_ms else {
                return false;
            };
            if self.min_duration_ms.is_some_and(|min| d < min)
                || self.max_duration_ms.is_some_and(|max| d > max)
            {
                return false;
            }
        }
        if let Some(term) = self.search_term() {
            let term = term.to_lowercase();
            let hit = r.job_class.to_lowercase().contains(&term)
                || r.uuid.to_lowercase().contains(&term)
                || r.display_name
                    .as_deref()
                    .is_some_and(|d| d.to_lowercase().contains(&term))
                || r.exception
                    .as_ref()
                    .is_some_and(|e| e.message.to_lowercase().contains(&term));
            if !hit {
                return false;
            }
        }
        true
    }

    /// Ordering used by the in-memory store. Nulls sort last in both
    /// directions, matching `NULLS LAST` in SQL. Ties break on id.
    pub fn compare(&self, a: &JobRecord, b: &JobRecord) -> Ordering {
        let primary = match self.sort_by {
            SortColumn::QueuedAt => cmp_nullable(a.queued_at, b.queued_at, self.sort_direction),
            SortColumn::StartedAt => cmp_nullable(a.started_at, b.started_at, self.sort_direction),
            SortColumn::CompletedAt => {
                cmp_nullable(a.completed_at, b.completed_at, self.sort_direction)
            }
            SortColumn::CreatedAt => directed(a.created_at.cmp(&b.created_at), self.sort_direction),
            SortColumn::DurationMs => {
                cmp_nullable(a.duration_ms, b.duration_ms, self.sort_direction)
            }
            SortColumn::Attempt => directed(a.attempt.cmp(&b.attempt), self.sort_direction),
            SortColumn::JobClass => directed(a.job_class.cmp(&b.job_class), self.sort_direction),
            SortColumn::Queue => directed(a.queue.cmp(&b.queue), self.sort_direction),
            SortColumn::Status => {
                directed(a.status.as_str().cmp(b.status.as_str()), self.sort_direction)
            }
        };
        primary.then_with(|| directed(a.id.cmp(&b.id), self.sort_direction))
    }
}

fn in_window<T: PartialOrd + Copy>(value: Option<T>, after: Option<T>, before: Option<T>) -> bool {
    if after.is_none() && before.is_none() {
        return true;
    }
    let Some(v) = value else {
        return false;
    };
    after.map_or(true, |a| v >= a) && before.map_or(true, |b| v <= b)
}

fn directed(ord: Ordering, dir: SortDirection) -> Ordering {
    match dir {
        SortDirection::Asc => ord,
        SortDirection::Desc => ord.reverse(),
    }
}

fn cmp_nullable<T: Ord>(a: Option<T>, b: Option<T>, dir: SortDirection) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => directed(x.cmp(&y), dir),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
