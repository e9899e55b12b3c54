use std::sync::Arc;
use std::time::Duration;

use queuemonitor::api;
use queuemonitor::config;
use queuemonitor::db;
use queuemonitor::jobs::PgJobStore;
use queuemonitor::replay::PgOutboxDispatcher;
use queuemonitor::telemetry;
use queuemonitor::Monitor;

use tokio::sync::broadcast::error::RecvError;

const ALERT_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();
    let cfg = config::Config::from_env()?;
    let api_addr = cfg.api_addr.clone();
    let prune_interval = Duration::from_secs(cfg.monitor.retention.interval_secs);

    tracing::info!(
        api = api_addr.as_deref().unwrap_or("disabled"),
        enabled = cfg.monitor.enabled,
        migrate_on_startup = cfg.migrate_on_startup,
        retention_days = cfg.monitor.retention.days,
        prune_interval_secs = cfg.monitor.retention.interval_secs,
        cache = cfg.monitor.cache.is_active(),
        "queue monitor starting"
    );

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
    }

    let monitor = Monitor::new(
        Arc::new(PgJobStore::new(pool.clone())),
        Arc::new(PgOutboxDispatcher::new(pool.clone())),
        cfg.monitor.clone(),
    );

    // ---- API task ----
    let app = api::router(api::ApiState::new(monitor.clone()));
    let api_handle = tokio::spawn(async move {
        if let Some(addr) = api_addr {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("queue monitor api listening on http://{addr}");
            axum::serve(listener, app).await?;
        } else {
            std::future::pending::<()>().await;
        }
        Ok::<(), anyhow::Error>(())
    });

    // ---- Retention task ----
    let retention_handle = {
        let retention = monitor.retention.clone();
        tokio::spawn(async move {
            loop {
                if let Err(e) = retention.prune(None, None).await {
                    tracing::warn!(error = %e, "prune failed");
                }
                tokio::time::sleep(prune_interval).await;
            }
            #[allow(unreachable_code)]
            Ok::<(), anyhow::Error>(())
        })
    };

    // ---- Alert watch task ----
    let alert_handle = {
        let alerts = monitor.alerts.clone();
        tokio::spawn(async move {
            loop {
                match alerts.check().await {
                    Ok(found) => {
                        for (key, alert) in found {
                            tracing::warn!(
                                alert = %key,
                                severity = ?alert.severity,
                                count = alert.count,
                                "{}",
                                alert.message
                            );
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "alert check failed"),
                }
                tokio::time::sleep(Duration::from_secs(ALERT_INTERVAL_SECS)).await;
            }
            #[allow(unreachable_code)]
            Ok::<(), anyhow::Error>(())
        })
    };

    // ---- Event log task ----
    let events_handle = {
        let mut rx = monitor.events.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let body = serde_json::to_string(&event)?;
                        tracing::debug!(event = %body, "monitor event");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event log lagging");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            Ok::<(), anyhow::Error>(())
        })
    };

    tokio::select! {
        res = api_handle => res??,
        res = retention_handle => res??,
        res = alert_handle => res??,
        res = events_handle => res??,
    }

    Ok(())
}
