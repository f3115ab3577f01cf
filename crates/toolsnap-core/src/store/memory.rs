//! In-memory snapshot store.

use super::SnapshotStore;
use crate::error::{SnapshotError, SnapshotResult};
use crate::model::{Snapshot, SnapshotId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-memory store; the reference backend contract.
///
/// Contents vanish with the process. This is the default backend and
/// the one the trait's semantics are tested against.
pub struct MemoryStore {
    data: RwLock<BTreeMap<SnapshotId, Snapshot>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn save(&self, snapshot: &Snapshot) -> SnapshotResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| SnapshotError::LockPoisoned(e.to_string()))?;
        data.insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    async fn get(&self, id: &SnapshotId) -> SnapshotResult<Option<Snapshot>> {
        let data = self
            .data
            .read()
            .map_err(|e| SnapshotError::LockPoisoned(e.to_string()))?;
        Ok(data.get(id).cloned())
    }

    async fn list(&self) -> SnapshotResult<Vec<Snapshot>> {
        let data = self
            .data
            .read()
            .map_err(|e| SnapshotError::LockPoisoned(e.to_string()))?;
        let mut snapshots: Vec<Snapshot> = data.values().cloned().collect();
        // Newest first
        snapshots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(snapshots)
    }

    async fn delete(&self, id: &SnapshotId) -> SnapshotResult<bool> {
        let mut data = self
            .data
            .write()
            .map_err(|e| SnapshotError::LockPoisoned(e.to_string()))?;
        Ok(data.remove(id).is_some())
    }

    async fn count(&self) -> SnapshotResult<usize> {
        let data = self
            .data
            .read()
            .map_err(|e| SnapshotError::LockPoisoned(e.to_string()))?;
        Ok(data.len())
    }

    async fn clear(&self) -> SnapshotResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| SnapshotError::LockPoisoned(e.to_string()))?;
        data.clear();
        Ok(())
    }
}
