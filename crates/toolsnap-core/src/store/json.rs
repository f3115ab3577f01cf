//! JSON file-based snapshot store.
//!
//! Each snapshot is stored as a separate pretty-printed JSON document:
//! `base_dir/snapshots/<snapshot_id>.json`. Writes go through a temp
//! file and rename so a crash never leaves a half-written record.

use super::SnapshotStore;
use crate::error::{SnapshotError, SnapshotResult};
use crate::model::{Snapshot, SnapshotId};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::{debug, warn};

/// JSON file-based store.
#[derive(Clone)]
pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    /// Create a new JSON store rooted at the given directory.
    ///
    /// The directory is created lazily on first write.
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn snapshots_dir(&self) -> PathBuf {
        self.base_dir.join("snapshots")
    }

    /// Map a snapshot id to its file path, rejecting ids that could
    /// escape the store directory.
    fn snapshot_path(&self, id: &SnapshotId) -> SnapshotResult<PathBuf> {
        let raw = id.as_str();
        if raw.is_empty()
            || raw.contains('/')
            || raw.contains('\\')
            || raw == "."
            || raw == ".."
        {
            return Err(SnapshotError::validation(format!(
                "Invalid snapshot id: {raw:?}"
            )));
        }
        Ok(self.snapshots_dir().join(format!("{raw}.json")))
    }
}

#[async_trait]
impl SnapshotStore for JsonStore {
    async fn save(&self, snapshot: &Snapshot) -> SnapshotResult<()> {
        let path = self.snapshot_path(&snapshot.id)?;
        debug!(path = %path.display(), "Writing snapshot record");

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = serde_json::to_string_pretty(snapshot)?;

        // Write atomically (write to temp file, then rename)
        let temp_path = path.with_extension("json.tmp");
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        Ok(())
    }

    async fn get(&self, id: &SnapshotId) -> SnapshotResult<Option<Snapshot>> {
        let path = self.snapshot_path(id)?;

        match fs::read_to_string(&path).await {
            Ok(content) => {
                let snapshot: Snapshot = serde_json::from_str(&content)?;
                Ok(Some(snapshot))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SnapshotError::Io(e)),
        }
    }

    async fn list(&self) -> SnapshotResult<Vec<Snapshot>> {
        let dir = self.snapshots_dir();
        let mut snapshots = Vec::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(snapshots),
            Err(e) => return Err(SnapshotError::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                match fs::read_to_string(&path).await {
                    Ok(content) => match serde_json::from_str::<Snapshot>(&content) {
                        Ok(snapshot) => snapshots.push(snapshot),
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "Skipping unreadable snapshot record")
                        }
                    },
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable snapshot record")
                    }
                }
            }
        }

        // Newest first
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(snapshots)
    }

    async fn delete(&self, id: &SnapshotId) -> SnapshotResult<bool> {
        let path = self.snapshot_path(id)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(snapshot_id = %id, "Deleted snapshot record");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(SnapshotError::Io(e)),
        }
    }

    async fn count(&self) -> SnapshotResult<usize> {
        let dir = self.snapshots_dir();
        let mut count = 0;

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(SnapshotError::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            if entry.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }

        Ok(count)
    }

    async fn clear(&self) -> SnapshotResult<()> {
        let dir = self.snapshots_dir();

        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SnapshotError::Io(e)),
        }
    }
}
