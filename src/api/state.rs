use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::hub::NotificationHub;
use crate::observability::Metrics;
use crate::pipeline::Pipeline;
use crate::storage::ArtifactStore;
use crate::transform::Transformer;
use crate::worker::WorkerPool;

/// Path prefix under which stored artifacts are served
pub const DOWNLOAD_PREFIX: &str = "/api/v1/download/";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: Arc<NotificationHub>,
    pub store: Arc<dyn ArtifactStore>,
    pub pool: Arc<WorkerPool>,
    pub pipeline: Arc<Pipeline>,
    pub metrics: Arc<Metrics>,
    /// Cancelled when the server begins shutting down
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Wire the hub, worker pool and pipeline around `store` and `transformer`
    ///
    /// Starts the worker pool, so this must run inside a tokio runtime.
    pub fn new(
        config: Config,
        store: Arc<dyn ArtifactStore>,
        transformer: Arc<dyn Transformer>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let hub = Arc::new(NotificationHub::new(config.hub.queue_depth));
        let pool = Arc::new(WorkerPool::start(config.pool_config()));
        let pipeline = Arc::new(Pipeline::new(
            transformer,
            store.clone(),
            hub.clone(),
            metrics.clone(),
            DOWNLOAD_PREFIX,
        ));

        Self {
            config: Arc::new(config),
            hub,
            store,
            pool,
            pipeline,
            metrics,
            shutdown: CancellationToken::new(),
        }
    }
}
