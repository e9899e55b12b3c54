use std::sync::Arc;

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::analytics::health::HealthReport;
use crate::analytics::statistics::{
    JobClassStatistics, JobStatistics, QueueHealth, QueueStatistics, ServerStatistics,
};
use crate::api::models::{
    AlertsResponse, BatchRequest, FailedReportQuery, JobListItem, ListJobsQuery, ListJobsResponse,
    PerformanceQuery, PerformanceReport, PruneRequest, PruneResponse, ScopeQuery, ScoreResponse,
};
use crate::error::MonitorError;
use crate::export::{ExportedJob, FailedJobsReport, StatisticsReport};
use crate::jobs::model::{JobRecord, ReplayRecord};
use crate::jobs::notifications::JobNotification;
use crate::jobs::store::{FailurePattern, TagStatistic};
use crate::monitor::Monitor;
use crate::replay::BatchOutcome;

pub mod models;

#[derive(Clone)]
pub struct ApiState {
    pub monitor: Arc<Monitor>,
}

impl ApiState {
    pub fn new(monitor: Monitor) -> Self {
        Self {
            monitor: Arc::new(monitor),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        // Jobs
        .route("/jobs", get(list_jobs))
        .route("/jobs/:uuid", get(get_job).delete(delete_job))
        .route("/jobs/:uuid/cancel", post(cancel_job))
        .route("/jobs/:uuid/retry-chain", get(retry_chain))
        .route("/jobs/:uuid/replay", post(replay_job))
        .route("/batch/replay", post(batch_replay))
        .route("/batch/delete", post(batch_delete))
        // Statistics
        .route("/statistics", get(global_statistics))
        .route("/statistics/servers", get(server_statistics))
        .route("/statistics/queues", get(queue_statistics))
        .route("/statistics/job-classes", get(job_class_statistics))
        .route("/statistics/queue-health", get(queue_health))
        .route("/statistics/failure-patterns", get(failure_patterns))
        .route("/statistics/tags", get(tag_statistics))
        .route("/statistics/performance", get(performance))
        // Health
        .route("/health", get(health))
        .route("/health/score", get(health_score))
        .route("/health/alerts", get(alerts))
        // Export
        .route("/export/csv", get(export_csv))
        .route("/export/json", get(export_json))
        .route("/export/report", get(export_report))
        .route("/export/failed", get(export_failed))
        // Maintenance and ingest
        .route("/prune", post(prune))
        .route("/notifications", post(notify))
        .layer(middleware::from_fn_with_state(state.clone(), require_enabled))
        .with_state(state)
}

/// Every route answers 503 while the monitor is switched off.
async fn require_enabled(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    if !state.monitor.config.enabled {
        return monitor_err(MonitorError::Disabled).into_response();
    }
    next.run(req).await
}

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

fn monitor_err(e: MonitorError) -> (StatusCode, String) {
    let status = match &e {
        MonitorError::NotFound(_) => StatusCode::NOT_FOUND,
        MonitorError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
        e if e.is_client_error() => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        tracing::error!(error = %e, "request failed");
        return (status, format!("internal error: {e}"));
    }
    (status, e.to_string())
}

pub async fn list_jobs(
    State(state): State<ApiState>,
    Query(q): Query<ListJobsQuery>,
) -> ApiResult<ListJobsResponse> {
    let filter = q.into_filter();
    let store = &state.monitor.store;
    let records = store.query(&filter).await.map_err(monitor_err)?;
    let total = store.count(&filter).await.map_err(monitor_err)?;

    Ok(Json(ListJobsResponse {
        items: records.iter().map(JobListItem::from).collect(),
        total,
        limit: filter.effective_limit(),
        offset: filter.effective_offset(),
    }))
}

pub async fn get_job(
    State(state): State<ApiState>,
    Path(uuid): Path<String>,
) -> ApiResult<JobRecord> {
    state
        .monitor
        .store
        .find_by_uuid(&uuid)
        .await
        .map_err(monitor_err)?
        .map(Json)
        .ok_or_else(|| monitor_err(MonitorError::NotFound(uuid)))
}

pub async fn delete_job(
    State(state): State<ApiState>,
    Path(uuid): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let deleted = state.monitor.store.delete(&uuid).await.map_err(monitor_err)?;
    if !deleted {
        return Err(monitor_err(MonitorError::NotFound(uuid)));
    }
    tracing::info!(uuid = %uuid, "job deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn cancel_job(
    State(state): State<ApiState>,
    Path(uuid): Path<String>,
) -> ApiResult<JobRecord> {
    state
        .monitor
        .tracker
        .cancel(&uuid)
        .await
        .map(Json)
        .map_err(monitor_err)
}

pub async fn retry_chain(
    State(state): State<ApiState>,
    Path(uuid): Path<String>,
) -> ApiResult<Vec<JobRecord>> {
    let chain = state.monitor.retry_chain(&uuid).await.map_err(monitor_err)?;
    if chain.is_empty() {
        return Err(monitor_err(MonitorError::NotFound(uuid)));
    }
    Ok(Json(chain))
}

pub async fn replay_job(
    State(state): State<ApiState>,
    Path(uuid): Path<String>,
) -> ApiResult<ReplayRecord> {
    state
        .monitor
        .replay
        .execute(&uuid)
        .await
        .map(Json)
        .map_err(monitor_err)
}

pub async fn batch_replay(
    State(state): State<ApiState>,
    Json(body): Json<BatchRequest>,
) -> ApiResult<BatchOutcome> {
    let target = body.into_target().ok_or_else(missing_target)?;
    state
        .monitor
        .batch
        .replay(target)
        .await
        .map(Json)
        .map_err(monitor_err)
}

pub async fn batch_delete(
    State(state): State<ApiState>,
    Json(body): Json<BatchRequest>,
) -> ApiResult<BatchOutcome> {
    let target = body.into_target().ok_or_else(missing_target)?;
    state
        .monitor
        .batch
        .delete(target)
        .await
        .map(Json)
        .map_err(monitor_err)
}

fn missing_target() -> (StatusCode, String) {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        "either uuids or filter is required".into(),
    )
}

pub async fn global_statistics(State(state): State<ApiState>) -> ApiResult<JobStatistics> {
    state
        .monitor
        .statistics
        .global_statistics()
        .await
        .map(Json)
        .map_err(monitor_err)
}

pub async fn server_statistics(
    State(state): State<ApiState>,
    Query(q): Query<ScopeQuery>,
) -> ApiResult<Vec<ServerStatistics>> {
    state
        .monitor
        .statistics
        .server_statistics(q.server.as_deref())
        .await
        .map(Json)
        .map_err(monitor_err)
}

pub async fn queue_statistics(
    State(state): State<ApiState>,
    Query(q): Query<ScopeQuery>,
) -> ApiResult<Vec<QueueStatistics>> {
    state
        .monitor
        .statistics
        .queue_statistics(q.queue.as_deref())
        .await
        .map(Json)
        .map_err(monitor_err)
}

pub async fn job_class_statistics(
    State(state): State<ApiState>,
    Query(q): Query<ScopeQuery>,
) -> ApiResult<Vec<JobClassStatistics>> {
    state
        .monitor
        .statistics
        .job_class_statistics(q.job_class.as_deref())
        .await
        .map(Json)
        .map_err(monitor_err)
}

pub async fn queue_health(State(state): State<ApiState>) -> ApiResult<Vec<QueueHealth>> {
    state
        .monitor
        .statistics
        .queue_health()
        .await
        .map(Json)
        .map_err(monitor_err)
}

pub async fn failure_patterns(State(state): State<ApiState>) -> ApiResult<Vec<FailurePattern>> {
    state
        .monitor
        .statistics
        .failure_patterns()
        .await
        .map(Json)
        .map_err(monitor_err)
}

pub async fn tag_statistics(State(state): State<ApiState>) -> ApiResult<Vec<TagStatistic>> {
    state
        .monitor
        .statistics
        .tag_statistics()
        .await
        .map(Json)
        .map_err(monitor_err)
}

pub async fn performance(
    State(state): State<ApiState>,
    Query(q): Query<PerformanceQuery>,
) -> ApiResult<PerformanceReport> {
    let perf = &state.monitor.performance;
    Ok(Json(PerformanceReport {
        percentiles: perf.percentiles_by_job_class(q.since).await.map_err(monitor_err)?,
        distribution: perf.duration_distribution(q.since).await.map_err(monitor_err)?,
        regressions: perf.detect_regressions().await.map_err(monitor_err)?,
        throughput: perf.throughput(q.hours.unwrap_or(1)).await.map_err(monitor_err)?,
        error_rate_trend: perf
            .error_rate_trend(q.days.unwrap_or(7))
            .await
            .map_err(monitor_err)?,
    }))
}

/// 200 when every check passes, 503 otherwise. The report is returned
/// either way.
pub async fn health(State(state): State<ApiState>) -> (StatusCode, Json<HealthReport>) {
    let report = state.monitor.health.check().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn health_score(State(state): State<ApiState>) -> Json<ScoreResponse> {
    Json(ScoreResponse {
        score: state.monitor.health.score().await,
    })
}

pub async fn alerts(State(state): State<ApiState>) -> ApiResult<AlertsResponse> {
    let alerts = state.monitor.alerts.check().await.map_err(monitor_err)?;
    let requires_attention = alerts
        .values()
        .any(|a| a.severity == crate::analytics::Severity::Critical);
    Ok(Json(AlertsResponse {
        requires_attention,
        alerts,
    }))
}

pub async fn export_csv(
    State(state): State<ApiState>,
    Query(q): Query<ListJobsQuery>,
) -> Result<Response, (StatusCode, String)> {
    let csv = state
        .monitor
        .exporter
        .to_csv(&q.into_filter())
        .await
        .map_err(monitor_err)?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"queue-monitor-jobs.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

pub async fn export_json(
    State(state): State<ApiState>,
    Query(q): Query<ListJobsQuery>,
) -> ApiResult<Vec<ExportedJob>> {
    state
        .monitor
        .exporter
        .to_json(&q.into_filter())
        .await
        .map(Json)
        .map_err(monitor_err)
}

pub async fn export_report(State(state): State<ApiState>) -> ApiResult<StatisticsReport> {
    state
        .monitor
        .exporter
        .statistics_report()
        .await
        .map(Json)
        .map_err(monitor_err)
}

pub async fn export_failed(
    State(state): State<ApiState>,
    Query(q): Query<FailedReportQuery>,
) -> ApiResult<FailedJobsReport> {
    state
        .monitor
        .exporter
        .failed_jobs_report(q.limit.unwrap_or(100))
        .await
        .map(Json)
        .map_err(monitor_err)
}

pub async fn prune(
    State(state): State<ApiState>,
    Json(body): Json<PruneRequest>,
) -> ApiResult<PruneResponse> {
    let deleted = state
        .monitor
        .retention
        .prune(body.days, body.statuses.as_deref())
        .await
        .map_err(monitor_err)?;
    Ok(Json(PruneResponse { deleted }))
}

/// Fire-and-forget ingest; tracking errors go to the tracker's reporter.
pub async fn notify(
    State(state): State<ApiState>,
    Json(notification): Json<JobNotification>,
) -> StatusCode {
    state.monitor.tracker.dispatch(notification);
    StatusCode::ACCEPTED
}
