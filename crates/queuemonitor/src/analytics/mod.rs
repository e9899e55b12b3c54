pub mod alerting;
pub mod cache;
pub mod health;
pub mod performance;
pub mod statistics;

pub use alerting::{Alert, AlertingEvaluator, Alerts, Severity};
pub use cache::AggregateCache;
pub use health::{HealthCheck, HealthReport};
pub use performance::PerformanceAnalyzer;
pub use statistics::{HealthStatus, JobStatistics, QueueHealth, StatisticsEngine};
