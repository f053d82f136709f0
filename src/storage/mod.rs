//! Ephemeral artifact storage
//!
//! Transformed images are written under a single root directory and live for
//! a fixed TTL. Creation time is encoded in the file name (see [`naming`]),
//! and a background [`Sweeper`] deletes anything past its TTL.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use resizebox::observability::Metrics;
//! use resizebox::storage::{LocalArtifactStore, SweepTrigger, Sweeper};
//!
//! let (trigger, signals) = SweepTrigger::channel();
//! let store = Arc::new(
//!     LocalArtifactStore::open("uploads", Duration::from_secs(300))
//!         .await?
//!         .with_sweep_trigger(trigger),
//! );
//! let sweeper = Sweeper::spawn(
//!     store.clone(),
//!     signals,
//!     Duration::from_secs(60),
//!     Arc::new(Metrics::new()),
//! );
//! ```

mod local;
pub mod naming;
mod sweeper;

pub use local::LocalArtifactStore;
pub use sweeper::{SweepTrigger, Sweeper};

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Artifact already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid artifact name: {0}")]
    InvalidName(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// A named, encoded artifact ready to be persisted
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: String,
    pub bytes: Bytes,
}

impl Artifact {
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Resolved location of a stored artifact
#[derive(Debug, Clone)]
pub struct ArtifactHandle {
    pub name: String,
    pub path: PathBuf,
    pub content_type: &'static str,
}

/// Outcome of a single sweep pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    /// Entries examined
    pub scanned: usize,
    /// Entries removed because their TTL elapsed
    pub expired: usize,
    /// Entries removed because no creation time could be parsed from the name
    pub malformed: usize,
    /// Removals that failed (logged, not escalated)
    pub failed: usize,
}

impl SweepStats {
    pub fn removed(&self) -> usize {
        self.expired + self.malformed
    }
}

/// Artifact persistence capability
///
/// The pipeline and the HTTP layer only see this trait, so tests can swap
/// the on-disk store for an in-memory stub.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist an artifact under its name
    async fn save(&self, artifact: Artifact) -> Result<()>;

    /// Resolve a live artifact by name
    async fn retrieve(&self, name: &str) -> Result<ArtifactHandle>;

    /// Delete every expired artifact
    async fn sweep(&self) -> Result<SweepStats>;
}

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type for an artifact name, derived from its extension
pub fn content_type_for(name: &str) -> &'static str {
    naming::extension(name)
        .and_then(|ext| image::ImageFormat::from_extension(ext))
        .map(|format| format.to_mime_type())
        .unwrap_or(FALLBACK_CONTENT_TYPE)
}
