//! Upload pipeline: transform, name, store, notify
//!
//! One [`UploadJob`] becomes one unit of work on the [`WorkerPool`]. The unit
//! has no caller to return to, so every outcome leaves as exactly one
//! [`Message`] on the [`NotificationHub`].

use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use crate::hub::{Message, NotificationHub};
use crate::observability::Metrics;
use crate::storage::{Artifact, ArtifactStore, StorageError, naming};
use crate::transform::{Dimensions, TransformError, Transformer, UploadFormat, encode_image};
use crate::worker::{PoolError, WorkerPool};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("transform task aborted: {0}")]
    Aborted(String),
}

/// An accepted upload waiting to be processed
#[derive(Debug, Clone)]
pub struct UploadJob {
    pub bytes: Bytes,
    pub original_name: String,
    pub format: UploadFormat,
    pub dimensions: Dimensions,
}

pub struct Pipeline {
    transformer: Arc<dyn Transformer>,
    store: Arc<dyn ArtifactStore>,
    hub: Arc<NotificationHub>,
    metrics: Arc<Metrics>,
    download_prefix: String,
}

impl Pipeline {
    pub fn new(
        transformer: Arc<dyn Transformer>,
        store: Arc<dyn ArtifactStore>,
        hub: Arc<NotificationHub>,
        metrics: Arc<Metrics>,
        download_prefix: impl Into<String>,
    ) -> Self {
        Self {
            transformer,
            store,
            hub,
            metrics,
            download_prefix: download_prefix.into(),
        }
    }

    /// Queue `job` on `pool`
    ///
    /// Returns as soon as the job is queued; the outcome arrives later on the hub.
    pub fn submit(self: &Arc<Self>, pool: &WorkerPool, job: UploadJob) -> Result<(), PoolError> {
        let pipeline = Arc::clone(self);
        pool.submit(async move {
            pipeline.process(job).await;
        })
    }

    /// Run `job` to completion and publish its outcome
    ///
    /// Returns the published message.
    pub async fn process(&self, job: UploadJob) -> Message {
        let original_name = job.original_name.clone();

        let message = match self.produce(job).await {
            Ok(name) => {
                info!(original_name = %original_name, name = %name, "Upload processed");
                Message::complete(format!("{}{}", self.download_prefix, name))
            }
            Err(e) => {
                warn!(original_name = %original_name, error = %e, "Upload processing failed");
                Message::failed()
            }
        };

        let report = self.hub.publish(&message);
        self.metrics.message_published();
        self.metrics.slow_consumers_dropped(report.dropped);

        message
    }

    /// Transform, encode and store; returns the stored artifact name
    async fn produce(&self, job: UploadJob) -> Result<String, PipelineError> {
        let UploadJob {
            bytes,
            original_name,
            format,
            dimensions,
        } = job;

        let transformer = Arc::clone(&self.transformer);
        let encoded = tokio::task::spawn_blocking(move || {
            let image = transformer.transform(&bytes, dimensions)?;
            encode_image(&image, format)
        })
        .await;

        let encoded = match encoded {
            Ok(Ok(encoded)) => encoded,
            Ok(Err(e)) => {
                self.metrics.transform_failed();
                return Err(e.into());
            }
            Err(e) => {
                self.metrics.transform_failed();
                return Err(PipelineError::Aborted(e.to_string()));
            }
        };

        // The extension follows the encoded bytes, not the client's name
        let name = naming::encode(&format.conform_name(&original_name), Utc::now().timestamp());

        if let Err(e) = self.store.save(Artifact::new(name.clone(), encoded)).await {
            self.metrics.storage_failed();
            return Err(e.into());
        }
        self.metrics.artifact_stored();

        Ok(name)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("download_prefix", &self.download_prefix)
            .finish_non_exhaustive()
    }
}
