mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use common::{harness, harness_with, job, queued_job, test_config, worker, Harness};
use queuemonitor::api::{self, ApiState};
use queuemonitor::jobs::{JobNotification, JobStatus, JobStore};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app(h: &Harness) -> Router {
    api::router(ApiState::new(h.monitor.clone()))
}

async fn send(app: Router, req: Request<Body>) -> (StatusCode, Vec<u8>) {
    let res = app.oneshot(req).await.unwrap();
    let status = res.status();
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let (status, body) = send(app, Request::get(uri).body(Body::empty()).unwrap()).await;
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let req = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let (status, body) = send(app, req).await;
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn list_jobs_filters_and_counts() {
    let h = harness();
    h.store.seed(job("a", JobStatus::Completed));
    h.store.seed(job("b", JobStatus::Failed));
    h.store.seed(job("c", JobStatus::Timeout));

    let (status, body) = get(app(&h), "/jobs?status=failed,timeout&limit=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["limit"], 1);
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
    assert!(body["items"][0].get("payload").is_none());
}

#[tokio::test]
async fn job_detail_and_not_found() {
    let h = harness();
    h.store.seed(job("a", JobStatus::Completed));

    let (status, body) = get(app(&h), "/jobs/a").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["uuid"], "a");
    assert_eq!(body["payload"]["invoice_id"], 7);

    let (status, _) = get(app(&h), "/jobs/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn delete_job_endpoint() {
    let h = harness();
    h.store.seed(job("a", JobStatus::Completed));

    let req = Request::delete("/jobs/a").body(Body::empty()).unwrap();
    let (status, _) = send(app(&h), req).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(h.store.is_empty());

    let req = Request::delete("/jobs/a").body(Body::empty()).unwrap();
    let (status, _) = send(app(&h), req).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn replay_status_mapping() {
    let h = harness();
    h.store.seed(job("done", JobStatus::Failed));
    h.store.seed(job("busy", JobStatus::Processing));

    let (status, body) = post(app(&h), "/jobs/done/replay", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["original_uuid"], "done");

    let (status, _) = post(app(&h), "/jobs/busy/replay", json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = post(app(&h), "/jobs/ghost/replay", json!({})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn disabled_monitor_maps_to_service_unavailable() {
    let mut config = test_config();
    config.enabled = false;
    let h = harness_with(config);
    h.store.seed(job("a", JobStatus::Failed));

    let (status, _) = post(app(&h), "/jobs/a/replay", json!({})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    for uri in ["/jobs", "/jobs/a", "/statistics", "/health/alerts", "/export/csv"] {
        let (status, _) = get(app(&h), uri).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
    }

    let (status, _) = post(app(&h), "/prune", json!({"days": 30})).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(h.store.len(), 1);
}

#[tokio::test]
async fn cancel_and_retry_chain_endpoints() {
    let h = harness();
    h.store.seed(job("q", JobStatus::Queued));

    let (status, body) = post(app(&h), "/jobs/q/cancel", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "cancelled");

    let (status, _) = post(app(&h), "/jobs/q/cancel", json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = get(app(&h), "/jobs/q/retry-chain").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, _) = get(app(&h), "/jobs/none/retry-chain").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn batch_endpoints() {
    let h = harness();
    h.store.seed(job("a", JobStatus::Failed));
    h.store.seed(job("b", JobStatus::Failed));

    let (status, body) = post(app(&h), "/batch/replay", json!({"uuids": ["a", "b", "x"]})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["succeeded"], 2);
    assert_eq!(body["failed"], 1);

    let (status, body) = post(
        app(&h),
        "/batch/delete",
        json!({"filter": {"statuses": ["failed"]}}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["succeeded"], 2);
    assert!(h.store.is_empty());

    let (status, _) = post(app(&h), "/batch/delete", json!({})).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn statistics_endpoints() {
    let h = harness();
    h.store.seed(job("a", JobStatus::Completed));
    h.store.seed(job("b", JobStatus::Failed));

    let (status, body) = get(app(&h), "/statistics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_jobs"], 2);
    assert_eq!(body["success_rate"], 50.0);

    for uri in [
        "/statistics/servers",
        "/statistics/queues?queue=emails",
        "/statistics/job-classes",
        "/statistics/queue-health",
        "/statistics/failure-patterns",
        "/statistics/tags",
    ] {
        let (status, body) = get(app(&h), uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert!(body.is_array(), "{uri}");
    }

    let (status, body) = get(app(&h), "/statistics/performance?days=3").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error_rate_trend"].as_array().unwrap().len(), 3);
    assert_eq!(body["distribution"].as_array().unwrap().len(), 6);
}

#[tokio::test]
async fn health_endpoints() {
    let h = harness();
    let (status, body) = get(app(&h), "/health").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "degraded");

    h.store.seed(job("a", JobStatus::Completed));
    let (status, body) = get(app(&h), "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (_, body) = get(app(&h), "/health/score").await;
    assert_eq!(body["score"], 100);

    let (status, body) = get(app(&h), "/health/alerts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["requires_attention"], false);
}

#[tokio::test]
async fn export_endpoints() {
    let h = harness();
    h.store.seed(job("a", JobStatus::Failed));

    let res = app(&h)
        .oneshot(Request::get("/export/csv").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    let body = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let csv = String::from_utf8(body.to_vec()).unwrap();
    assert!(csv.starts_with("UUID,Job Class,"));

    let (status, body) = get(app(&h), "/export/json?status=failed").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (_, body) = get(app(&h), "/export/report").await;
    assert_eq!(body["global"]["total_jobs"], 1);

    let (_, body) = get(app(&h), "/export/failed?limit=5").await;
    assert_eq!(body["total_failed"], 1);
}

#[tokio::test]
async fn prune_endpoint() {
    let h = harness();
    h.store.seed(common::aged(
        job("old", JobStatus::Completed),
        chrono::Utc::now() - chrono::Duration::days(60),
    ));

    let (status, body) = post(app(&h), "/prune", json!({"days": 30, "statuses": ["completed"]})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 1);
}

#[tokio::test]
async fn notifications_are_accepted_and_applied() {
    let h = harness();
    let notification = JobNotification::Enqueued {
        job: queued_job("n-1"),
        worker: worker(),
    };

    let (status, _) = post(app(&h), "/notifications", serde_json::to_value(&notification).unwrap()).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    // Ingest is fire-and-forget; wait for the spawned task.
    for _ in 0..50 {
        if h.store.find_by_uuid("n-1").await.unwrap().is_some() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("notification was never recorded");
}
