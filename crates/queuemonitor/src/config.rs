use std::time::Duration;

use crate::jobs::model::JobStatus;

// Config is the process-level configuration: where the database lives,
// where the API listens, and the monitor settings shared by every component.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub api_addr: Option<String>,
    pub migrate_on_startup: bool,
    pub monitor: MonitorConfig,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = env_or_fallback("QUEUE_MONITOR_DATABASE_URL", "DATABASE_URL")
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is missing"))?;

        let api_addr = env_or_fallback("QUEUE_MONITOR_API_ADDR", "API_ADDR")
            .or_else(|| Some("0.0.0.0:8080".to_string()))
            .and_then(|s| normalize_optional_addr(&s));

        let migrate_on_startup = env_bool("QUEUE_MONITOR_MIGRATE_ON_STARTUP").unwrap_or(false);

        Ok(Self {
            database_url,
            api_addr,
            migrate_on_startup,
            monitor: MonitorConfig::from_env(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct MonitorConfig {
    /// Master switch. When off, tracking is a no-op and replay refuses.
    pub enabled: bool,
    pub storage: StorageConfig,
    pub retention: RetentionConfig,
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    /// Job classes replay may dispatch. Empty means any class.
    pub known_job_classes: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub store_payload: bool,
    pub payload_max_bytes: usize,
    /// Write tags from a background task instead of inline.
    pub deferred_tags: bool,
    /// Payload keys replaced before storage (case-insensitive substring match).
    pub redact_keys: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct RetentionConfig {
    pub days: i64,
    pub prune_statuses: Vec<JobStatus>,
    pub interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CacheConfig {
    pub enabled: bool,
    /// Backing store name. `none` disables caching like `enabled = false`.
    pub store: String,
    pub ttl_secs: u64,
    pub queue_health_ttl_secs: u64,
    pub prefix: String,
    pub max_capacity: u64,
}

#[derive(Clone, Debug)]
pub struct BatchConfig {
    pub chunk_size: usize,
    pub max_replay: usize,
    pub max_delete: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            storage: StorageConfig::default(),
            retention: RetentionConfig::default(),
            cache: CacheConfig::default(),
            batch: BatchConfig::default(),
            known_job_classes: Vec::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_payload: true,
            payload_max_bytes: 65_535,
            deferred_tags: false,
            redact_keys: Vec::new(),
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: 30,
            prune_statuses: vec![JobStatus::Completed],
            interval_secs: 3600,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store: "memory".to_string(),
            ttl_secs: 60,
            queue_health_ttl_secs: 30,
            prefix: "queue_monitor_".to_string(),
            max_capacity: 10_000,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            max_replay: 100,
            max_delete: 1000,
        }
    }
}

impl CacheConfig {
    pub fn is_active(&self) -> bool {
        self.enabled && !self.store.eq_ignore_ascii_case("none")
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn queue_health_ttl(&self) -> Duration {
        Duration::from_secs(self.queue_health_ttl_secs)
    }
}

impl MonitorConfig {
    /// Reads `QUEUE_MONITOR_*` overrides on top of the defaults.
    pub fn from_env() -> Self {
        let d = Self::default();

        let storage = StorageConfig {
            store_payload: env_bool("QUEUE_MONITOR_STORE_PAYLOAD").unwrap_or(d.storage.store_payload),
            payload_max_bytes: env_parse("QUEUE_MONITOR_PAYLOAD_MAX_SIZE")
                .unwrap_or(d.storage.payload_max_bytes),
            deferred_tags: env_bool("QUEUE_MONITOR_DEFERRED_TAGS").unwrap_or(d.storage.deferred_tags),
            redact_keys: env_list("QUEUE_MONITOR_REDACT_KEYS").unwrap_or(d.storage.redact_keys),
        };

        let prune_statuses = env_list("QUEUE_MONITOR_PRUNE_STATUSES")
            .map(|items| items.iter().filter_map(|s| JobStatus::parse(s)).collect())
            .unwrap_or(d.retention.prune_statuses);

        let retention = RetentionConfig {
            days: env_parse("QUEUE_MONITOR_RETENTION_DAYS").unwrap_or(d.retention.days),
            prune_statuses,
            interval_secs: env_parse("QUEUE_MONITOR_PRUNE_INTERVAL_SECS")
                .unwrap_or(d.retention.interval_secs)
                .max(1),
        };

        let cache = CacheConfig {
            enabled: env_bool("QUEUE_MONITOR_CACHE_ENABLED").unwrap_or(d.cache.enabled),
            store: env_or_fallback("QUEUE_MONITOR_CACHE_STORE", "CACHE_STORE")
                .unwrap_or(d.cache.store),
            ttl_secs: env_parse("QUEUE_MONITOR_CACHE_TTL").unwrap_or(d.cache.ttl_secs),
            queue_health_ttl_secs: env_parse("QUEUE_MONITOR_QUEUE_HEALTH_TTL")
                .unwrap_or(d.cache.queue_health_ttl_secs),
            prefix: std::env::var("QUEUE_MONITOR_CACHE_PREFIX").unwrap_or(d.cache.prefix),
            max_capacity: env_parse("QUEUE_MONITOR_CACHE_CAPACITY").unwrap_or(d.cache.max_capacity),
        };

        let batch = BatchConfig {
            chunk_size: env_parse("QUEUE_MONITOR_BATCH_CHUNK_SIZE")
                .unwrap_or(d.batch.chunk_size)
                .max(1),
            max_replay: env_parse("QUEUE_MONITOR_BATCH_MAX_REPLAY").unwrap_or(d.batch.max_replay),
            max_delete: env_parse("QUEUE_MONITOR_BATCH_MAX_DELETE").unwrap_or(d.batch.max_delete),
        };

        Self {
            enabled: env_bool("QUEUE_MONITOR_ENABLED").unwrap_or(d.enabled),
            storage,
            retention,
            cache,
            batch,
            known_job_classes: env_list("QUEUE_MONITOR_JOB_CLASSES").unwrap_or_default(),
        }
    }
}

fn env_or_fallback(primary: &str, fallback: &str) -> Option<String> {
    std::env::var(primary)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .or_else(|| std::env::var(fallback).ok().filter(|s| !s.trim().is_empty()))
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

// Comma separated, blanks dropped.
fn env_list(key: &str) -> Option<Vec<String>> {
    std::env::var(key).ok().map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}
