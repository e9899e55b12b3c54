pub mod batch;
pub mod dispatcher;
pub mod orchestrator;

pub use batch::{BatchOperator, BatchOutcome, BatchTarget};
pub use dispatcher::{AnyJobClass, JobClassResolver, KnownJobClasses, PgOutboxDispatcher, QueueDispatcher};
pub use orchestrator::ReplayOrchestrator;
