//! Local filesystem artifact store

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use super::sweeper::SweepTrigger;
use super::{
    Artifact, ArtifactHandle, ArtifactStore, Result, StorageError, SweepStats, content_type_for,
    naming,
};

/// Stores artifacts as plain files under one root directory
///
/// Every save opens its own handle, so concurrent saves of different
/// artifacts proceed in parallel. Files are created with `create_new`:
/// a second save under an existing name fails with
/// [`StorageError::AlreadyExists`] instead of replacing the first artifact.
#[derive(Debug)]
pub struct LocalArtifactStore {
    root: PathBuf,
    ttl: Duration,
    trigger: Option<SweepTrigger>,
}

impl LocalArtifactStore {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open<P: AsRef<Path>>(root: P, ttl: Duration) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        info!(root = %root.display(), ttl_secs = ttl.as_secs(), "Artifact store opened");

        Ok(Self {
            root,
            ttl,
            trigger: None,
        })
    }

    /// Signal `trigger` after every successful save
    pub fn with_sweep_trigger(mut self, trigger: SweepTrigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// True when an artifact created at `created_at` has outlived the TTL at `now`
    fn is_expired(&self, created_at: i64, now: i64) -> bool {
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        now.saturating_sub(created_at) > ttl
    }

    /// Resolve `name` to a path inside the root, rejecting anything that
    /// could escape it
    fn resolve(&self, name: &str) -> Result<PathBuf> {
        let escapes = name.is_empty()
            || name.contains(['/', '\\'])
            || name == "."
            || name == ".."
            || Path::new(name).is_absolute();

        if escapes {
            return Err(StorageError::InvalidName(name.to_string()));
        }

        Ok(self.root.join(name))
    }

    /// Run one sweep pass treating `now` as the current unix time
    pub async fn sweep_at(&self, now: i64) -> Result<SweepStats> {
        let mut stats = SweepStats::default();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to stat entry during sweep");
                    stats.failed += 1;
                    continue;
                }
            };

            if !file_type.is_file() {
                continue;
            }

            stats.scanned += 1;
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();

            match naming::decode_created_at(&name) {
                Some(created_at) if !self.is_expired(created_at, now) => continue,
                Some(created_at) => {
                    if remove(&entry.path()).await {
                        debug!(name = %name, age_secs = now.saturating_sub(created_at), "Removed expired artifact");
                        stats.expired += 1;
                    } else {
                        stats.failed += 1;
                    }
                }
                None => {
                    // No creation time to compare against, so the entry could
                    // otherwise never expire
                    if remove(&entry.path()).await {
                        warn!(name = %name, "Removed artifact with unparseable name");
                        stats.malformed += 1;
                    } else {
                        stats.failed += 1;
                    }
                }
            }
        }

        if stats.removed() > 0 || stats.failed > 0 {
            info!(
                scanned = stats.scanned,
                expired = stats.expired,
                malformed = stats.malformed,
                failed = stats.failed,
                "Sweep complete"
            );
        } else {
            debug!(scanned = stats.scanned, "Sweep complete, nothing expired");
        }

        Ok(stats)
    }
}

/// Best-effort delete; failures are logged and reported as `false`
async fn remove(path: &Path) -> bool {
    match fs::remove_file(path).await {
        Ok(()) => true,
        // Already gone (a concurrent sweep got there first)
        Err(e) if e.kind() == ErrorKind::NotFound => true,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove artifact");
            false
        }
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    async fn save(&self, artifact: Artifact) -> Result<()> {
        let path = self.resolve(&artifact.name)?;

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StorageError::AlreadyExists(artifact.name.clone()),
                _ => StorageError::Io(e),
            })?;

        let mut writer = BufWriter::new(file);
        let written: std::io::Result<()> = async {
            writer.write_all(&artifact.bytes).await?;
            // Flush buffered bytes and close the handle
            writer.shutdown().await
        }
        .await;

        if let Err(e) = written {
            warn!(name = %artifact.name, error = %e, "Write failed, removing partial artifact");
            let _ = fs::remove_file(&path).await;
            return Err(StorageError::Io(e));
        }

        info!(name = %artifact.name, size = artifact.bytes.len(), "Artifact saved");

        if let Some(trigger) = &self.trigger {
            trigger.fire();
        }

        Ok(())
    }

    async fn retrieve(&self, name: &str) -> Result<ArtifactHandle> {
        let path = self
            .resolve(name)
            .map_err(|_| StorageError::NotFound(name.to_string()))?;

        let metadata = match fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(name.to_string()));
            }
            Err(e) => return Err(StorageError::Io(e)),
        };

        if !metadata.is_file() {
            return Err(StorageError::NotFound(name.to_string()));
        }

        // Past its TTL but not yet swept
        let now = chrono::Utc::now().timestamp();
        match naming::decode_created_at(name) {
            Some(created_at) if !self.is_expired(created_at, now) => {}
            _ => return Err(StorageError::NotFound(name.to_string())),
        }

        Ok(ArtifactHandle {
            name: name.to_string(),
            path,
            content_type: content_type_for(name),
        })
    }

    async fn sweep(&self) -> Result<SweepStats> {
        self.sweep_at(chrono::Utc::now().timestamp()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(300);

    async fn open_store() -> (LocalArtifactStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::open(temp_dir.path(), TTL).await.unwrap();
        (store, temp_dir)
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    #[tokio::test]
    async fn test_open_creates_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("nested").join("uploads");

        let store = LocalArtifactStore::open(&root, TTL).await.unwrap();
        assert!(root.is_dir());
        assert_eq!(store.root(), root.as_path());
    }

    #[tokio::test]
    async fn test_save_then_retrieve() {
        let (store, _dir) = open_store().await;
        let name = naming::encode("photo.png", now());

        store
            .save(Artifact::new(name.clone(), b"png-bytes".to_vec()))
            .await
            .unwrap();

        let handle = store.retrieve(&name).await.unwrap();
        assert_eq!(handle.name, name);
        assert_eq!(handle.content_type, "image/png");
        assert_eq!(std::fs::read(&handle.path).unwrap(), b"png-bytes");
    }

    #[tokio::test]
    async fn test_retrieve_missing() {
        let (store, _dir) = open_store().await;

        let result = store.retrieve("absent_1700000000.png").await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_retrieve_rejects_traversal() {
        let (store, _dir) = open_store().await;

        for name in ["../etc/passwd", "a/b_1.png", "..", ".", ""] {
            let result = store.retrieve(name).await;
            assert!(matches!(result, Err(StorageError::NotFound(_))), "{name}");
        }
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_name() {
        let (store, _dir) = open_store().await;

        let result = store.save(Artifact::new("../x_1.png", vec![1u8])).await;
        assert!(matches!(result, Err(StorageError::InvalidName(_))));
    }

    #[tokio::test]
    async fn test_dots_inside_a_name_are_allowed() {
        let (store, _dir) = open_store().await;
        let name = naming::encode("holiday..final.png", now());

        store
            .save(Artifact::new(name.clone(), vec![7u8]))
            .await
            .unwrap();

        let handle = store.retrieve(&name).await.unwrap();
        assert_eq!(handle.path, store.root().join(&name));
        assert_eq!(std::fs::read(&handle.path).unwrap(), vec![7u8]);
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let temp_dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::open(temp_dir.path(), Duration::from_secs(u64::MAX))
            .await
            .unwrap();
        let name = naming::encode("old.png", 0);
        store.save(Artifact::new(name.clone(), vec![0u8])).await.unwrap();

        assert!(store.retrieve(&name).await.is_ok());
        let stats = store.sweep().await.unwrap();
        assert_eq!(stats.expired, 0);
        assert!(store.root().join(&name).exists());
    }

    #[tokio::test]
    async fn test_save_refuses_to_overwrite() {
        let (store, _dir) = open_store().await;
        let name = naming::encode("photo.png", now());

        store.save(Artifact::new(name.clone(), vec![1u8])).await.unwrap();
        let second = store.save(Artifact::new(name.clone(), vec![2u8])).await;

        assert!(matches!(second, Err(StorageError::AlreadyExists(_))));
        let handle = store.retrieve(&name).await.unwrap();
        assert_eq!(std::fs::read(&handle.path).unwrap(), vec![1u8]);
    }

    #[tokio::test]
    async fn test_retrieve_expired_but_unswept() {
        let (store, _dir) = open_store().await;
        let name = naming::encode("old.png", now() - 301);
        store.save(Artifact::new(name.clone(), vec![0u8])).await.unwrap();

        let result = store.retrieve(&name).await;
        assert!(matches!(result, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_ttl_boundary() {
        let (store, _dir) = open_store().await;
        let t = 1_000_000;
        let name = naming::encode("x.png", t);
        store.save(Artifact::new(name.clone(), vec![0u8])).await.unwrap();

        // age == ttl is still live
        let stats = store.sweep_at(t + 300).await.unwrap();
        assert_eq!(stats.expired, 0);
        assert!(store.root().join(&name).exists());

        let stats = store.sweep_at(t + 301).await.unwrap();
        assert_eq!(stats.expired, 1);
        assert!(!store.root().join(&name).exists());
    }

    #[tokio::test]
    async fn test_sweep_evicts_expired_and_keeps_live() {
        let (store, _dir) = open_store().await;
        let live = naming::encode("live.png", now());
        let expired = naming::encode("expired.png", now() - 600);

        store.save(Artifact::new(live.clone(), vec![1u8])).await.unwrap();
        store.save(Artifact::new(expired.clone(), vec![2u8])).await.unwrap();

        let stats = store.sweep().await.unwrap();
        assert_eq!(stats.scanned, 2);
        assert_eq!(stats.expired, 1);
        assert_eq!(stats.malformed, 0);

        assert!(store.retrieve(&live).await.is_ok());
        assert!(matches!(
            store.retrieve(&expired).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_sweep_removes_malformed_names() {
        let (store, _dir) = open_store().await;
        std::fs::write(store.root().join("no-timestamp.png"), b"x").unwrap();

        let stats = store.sweep().await.unwrap();
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.expired, 0);
        assert!(!store.root().join("no-timestamp.png").exists());
    }

    #[tokio::test]
    async fn test_sweep_skips_directories() {
        let (store, _dir) = open_store().await;
        std::fs::create_dir(store.root().join("subdir")).unwrap();

        let stats = store.sweep().await.unwrap();
        assert_eq!(stats.scanned, 0);
        assert!(store.root().join("subdir").is_dir());
    }

    #[tokio::test]
    async fn test_save_fires_trigger() {
        let (trigger, mut signals) = SweepTrigger::channel();
        let temp_dir = TempDir::new().unwrap();
        let store = LocalArtifactStore::open(temp_dir.path(), TTL)
            .await
            .unwrap()
            .with_sweep_trigger(trigger);

        store
            .save(Artifact::new(naming::encode("a.png", now()), vec![0u8]))
            .await
            .unwrap();

        assert!(signals.try_recv().is_ok());
    }
}
