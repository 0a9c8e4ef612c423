use std::sync::Arc;

use crate::config::Config;
use crate::ledger::FjallStore;
use crate::observability::Metrics;
use crate::progress::ProgressTracker;
use crate::queue::TaskBroker;
use crate::source::Canonicalizer;
use crate::storage::ArtifactStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub canonicalizer: Arc<Canonicalizer>,
    pub broker: Arc<TaskBroker>,
    pub ledger: Arc<FjallStore>,
    pub progress: ProgressTracker,
    pub artifacts: ArtifactStore,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        ledger: Arc<FjallStore>,
        broker: Arc<TaskBroker>,
        artifacts: ArtifactStore,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            canonicalizer: Arc::new(Canonicalizer::new(&config.sources)),
            config: Arc::new(config),
            progress: ProgressTracker::new(ledger.clone()),
            ledger,
            broker,
            artifacts,
            metrics,
        }
    }
}
