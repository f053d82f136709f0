//! Observability: process counters and tracing setup

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// Filtering follows `RUST_LOG`, falling back to `info`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Counters for the upload/transform/notify lifecycle
#[derive(Debug, Default)]
pub struct Metrics {
    uploads_accepted: AtomicU64,
    uploads_rejected: AtomicU64,
    transforms_failed: AtomicU64,
    artifacts_stored: AtomicU64,
    storage_failures: AtomicU64,
    messages_published: AtomicU64,
    slow_consumers_dropped: AtomicU64,
    artifacts_swept: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upload_accepted(&self) {
        Self::bump(&self.uploads_accepted, "uploads_accepted", 1);
    }

    pub fn upload_rejected(&self) {
        Self::bump(&self.uploads_rejected, "uploads_rejected", 1);
    }

    pub fn transform_failed(&self) {
        Self::bump(&self.transforms_failed, "transforms_failed", 1);
    }

    pub fn artifact_stored(&self) {
        Self::bump(&self.artifacts_stored, "artifacts_stored", 1);
    }

    pub fn storage_failed(&self) {
        Self::bump(&self.storage_failures, "storage_failures", 1);
    }

    pub fn message_published(&self) {
        Self::bump(&self.messages_published, "messages_published", 1);
    }

    pub fn slow_consumers_dropped(&self, count: usize) {
        if count > 0 {
            Self::bump(&self.slow_consumers_dropped, "slow_consumers_dropped", count as u64);
        }
    }

    pub fn artifacts_swept(&self, count: usize) {
        if count > 0 {
            Self::bump(&self.artifacts_swept, "artifacts_swept", count as u64);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            uploads_accepted: self.uploads_accepted.load(Ordering::Relaxed),
            uploads_rejected: self.uploads_rejected.load(Ordering::Relaxed),
            transforms_failed: self.transforms_failed.load(Ordering::Relaxed),
            artifacts_stored: self.artifacts_stored.load(Ordering::Relaxed),
            storage_failures: self.storage_failures.load(Ordering::Relaxed),
            messages_published: self.messages_published.load(Ordering::Relaxed),
            slow_consumers_dropped: self.slow_consumers_dropped.load(Ordering::Relaxed),
            artifacts_swept: self.artifacts_swept.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64, name: &'static str, by: u64) {
        counter.fetch_add(by, Ordering::Relaxed);
        tracing::debug!(counter = name, by, "Metric incremented");
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub uploads_accepted: u64,
    pub uploads_rejected: u64,
    pub transforms_failed: u64,
    pub artifacts_stored: u64,
    pub storage_failures: u64,
    pub messages_published: u64,
    pub slow_consumers_dropped: u64,
    pub artifacts_swept: u64,
}
