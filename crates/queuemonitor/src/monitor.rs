use std::sync::Arc;

use crate::analytics::{AlertingEvaluator, HealthCheck, PerformanceAnalyzer, StatisticsEngine};
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::export::Exporter;
use crate::jobs::events::{BroadcastEvents, EventSink};
use crate::jobs::maintenance::Retention;
use crate::jobs::model::JobRecord;
use crate::jobs::retry_chain;
use crate::jobs::store::JobStore;
use crate::jobs::tracker::LifecycleTracker;
use crate::replay::{
    AnyJobClass, BatchOperator, JobClassResolver, KnownJobClasses, QueueDispatcher,
    ReplayOrchestrator,
};

/// Every monitor component wired over one store.
#[derive(Clone)]
pub struct Monitor {
    pub store: Arc<dyn JobStore>,
    pub config: Arc<MonitorConfig>,
    pub events: BroadcastEvents,
    pub tracker: LifecycleTracker,
    pub statistics: StatisticsEngine,
    pub alerts: AlertingEvaluator,
    pub health: HealthCheck,
    pub performance: PerformanceAnalyzer,
    pub replay: ReplayOrchestrator,
    pub batch: BatchOperator,
    pub retention: Retention,
    pub exporter: Exporter,
}

impl Monitor {
    /// The class resolver comes from `known_job_classes`; an empty list
    /// accepts every class.
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<dyn QueueDispatcher>,
        config: MonitorConfig,
    ) -> Self {
        let resolver: Arc<dyn JobClassResolver> = if config.known_job_classes.is_empty() {
            Arc::new(AnyJobClass)
        } else {
            Arc::new(KnownJobClasses::new(config.known_job_classes.clone()))
        };
        Self::with_resolver(store, dispatcher, resolver, config)
    }

    pub fn with_resolver(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<dyn QueueDispatcher>,
        resolver: Arc<dyn JobClassResolver>,
        config: MonitorConfig,
    ) -> Self {
        let config = Arc::new(config);
        let events = BroadcastEvents::default();
        let sink: Arc<dyn EventSink> = Arc::new(events.clone());

        let tracker = LifecycleTracker::new(store.clone(), config.clone()).with_events(sink.clone());
        let statistics = StatisticsEngine::new(store.clone(), &config.cache);
        let replay = ReplayOrchestrator::new(store.clone(), dispatcher, resolver, config.clone())
            .with_events(sink);
        let batch = BatchOperator::new(store.clone(), replay.clone(), config.clone());

        Self {
            alerts: AlertingEvaluator::new(store.clone()),
            health: HealthCheck::new(store.clone()),
            performance: PerformanceAnalyzer::new(store.clone()),
            retention: Retention::new(store.clone(), config.clone()),
            exporter: Exporter::new(store.clone(), statistics.clone()),
            store,
            config,
            events,
            tracker,
            statistics,
            replay,
            batch,
        }
    }

    pub async fn retry_chain(&self, uuid: &str) -> Result<Vec<JobRecord>> {
        retry_chain::resolve(self.store.as_ref(), uuid).await
    }
}
