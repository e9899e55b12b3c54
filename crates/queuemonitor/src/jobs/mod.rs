pub mod events;
pub mod filter;
pub mod memory;
pub mod model;
pub mod notifications;
pub mod payload;
pub mod repo;
pub mod retry_chain;
pub mod store;
pub mod tags;
pub mod tracker;
pub mod transitions;
pub mod worker_context;

pub mod maintenance;
pub use maintenance::{cutoff_days, Retention, MAX_RETENTION_DAYS};

pub use events::{BroadcastEvents, EventSink, MonitorEvent};
pub use filter::{JobFilter, SortColumn, SortDirection};
pub use memory::MemoryJobStore;
pub use model::{ExceptionInfo, JobPatch, JobRecord, JobStatus, NewJobRecord, ReplayRecord, WorkerType};
pub use notifications::{JobNotification, QueuedJob};
pub use repo::PgJobStore;
pub use store::JobStore;
pub use tracker::{ErrorReporter, LifecycleTracker, TracingReporter};
pub use worker_context::WorkerContext;
