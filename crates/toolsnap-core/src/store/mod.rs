//! Pluggable snapshot persistence.
//!
//! This module provides the storage abstraction with two backends:
//! - In-memory storage (default; the reference backend contract)
//! - JSON file storage (one document per snapshot)
//!
//! A process-wide shared handle guarantees that independently
//! constructed managers observe the same snapshot list.

pub mod json;
pub mod memory;

pub use json::JsonStore;
pub use memory::MemoryStore;

use crate::error::{SnapshotError, SnapshotResult};
use crate::model::{Snapshot, SnapshotId};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A persistence backend for snapshot records.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist a snapshot, replacing any record with the same id.
    async fn save(&self, snapshot: &Snapshot) -> SnapshotResult<()>;

    /// Fetch a snapshot by id.
    ///
    /// Returns `None` if no record exists.
    async fn get(&self, id: &SnapshotId) -> SnapshotResult<Option<Snapshot>>;

    /// List all snapshots, newest first.
    async fn list(&self) -> SnapshotResult<Vec<Snapshot>>;

    /// Delete a snapshot. Returns whether a record existed.
    async fn delete(&self, id: &SnapshotId) -> SnapshotResult<bool>;

    /// Number of stored snapshots.
    async fn count(&self) -> SnapshotResult<usize>;

    /// Remove every stored snapshot.
    async fn clear(&self) -> SnapshotResult<()>;
}

/// Storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-memory store; contents vanish with the process.
    #[default]
    Memory,
    /// One JSON document per snapshot under `base_dir`.
    Json { base_dir: PathBuf },
}

/// Construct a store for the selected backend.
pub fn open_store(backend: &StoreBackend) -> Arc<dyn SnapshotStore> {
    match backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Json { base_dir } => Arc::new(JsonStore::new(base_dir.clone())),
    }
}

/// Process-wide shared store handle.
static SHARED_STORE: Lazy<RwLock<Option<Arc<dyn SnapshotStore>>>> =
    Lazy::new(|| RwLock::new(None));

/// Install a store as the process-wide shared handle.
///
/// Fails if a handle is already installed. Tests replacing the handle
/// call [`reset_shared_store`] first.
pub fn init_shared_store(store: Arc<dyn SnapshotStore>) -> SnapshotResult<()> {
    let mut guard = SHARED_STORE
        .write()
        .map_err(|e| SnapshotError::LockPoisoned(e.to_string()))?;
    if guard.is_some() {
        return Err(SnapshotError::store(
            "Shared snapshot store already initialized",
        ));
    }
    *guard = Some(store);
    debug!("Shared snapshot store initialized");
    Ok(())
}

/// Get the process-wide shared store, installing an in-memory store on
/// first use.
pub fn shared_store() -> Arc<dyn SnapshotStore> {
    {
        let guard = SHARED_STORE.read().unwrap_or_else(|e| e.into_inner());
        if let Some(store) = guard.as_ref() {
            return Arc::clone(store);
        }
    }

    let mut guard = SHARED_STORE.write().unwrap_or_else(|e| e.into_inner());
    let store = guard.get_or_insert_with(|| {
        debug!("Installing default in-memory snapshot store");
        let store: Arc<dyn SnapshotStore> = Arc::new(MemoryStore::new());
        store
    });
    Arc::clone(store)
}

/// Drop the process-wide shared handle (test isolation).
pub fn reset_shared_store() {
    let mut guard = SHARED_STORE.write().unwrap_or_else(|e| e.into_inner());
    *guard = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Tests touching the process-wide handle must not interleave.
    static GLOBAL_HANDLE_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_backend_serde() {
        let json = serde_json::to_string(&StoreBackend::Memory).unwrap();
        assert_eq!(json, r#"{"type":"memory"}"#);

        let parsed: StoreBackend =
            serde_json::from_str(r#"{"type":"json","base_dir":"/tmp/s"}"#).unwrap();
        assert_eq!(
            parsed,
            StoreBackend::Json {
                base_dir: "/tmp/s".into()
            }
        );
    }

    #[tokio::test]
    async fn test_open_store_memory_backend() {
        let store = open_store(&StoreBackend::Memory);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_shared_store_returns_same_handle() {
        let _guard = GLOBAL_HANDLE_LOCK.lock().unwrap();
        reset_shared_store();
        let a = shared_store();
        let b = shared_store();
        assert!(Arc::ptr_eq(&a, &b));
        reset_shared_store();
    }

    #[tokio::test]
    async fn test_init_twice_is_an_error() {
        let _guard = GLOBAL_HANDLE_LOCK.lock().unwrap();
        reset_shared_store();
        init_shared_store(Arc::new(MemoryStore::new())).unwrap();
        let second = init_shared_store(Arc::new(MemoryStore::new()));
        assert!(second.is_err());
        reset_shared_store();
    }

    #[tokio::test]
    async fn test_init_after_reset_succeeds() {
        let _guard = GLOBAL_HANDLE_LOCK.lock().unwrap();
        reset_shared_store();
        init_shared_store(Arc::new(MemoryStore::new())).unwrap();
        reset_shared_store();
        init_shared_store(Arc::new(MemoryStore::new())).unwrap();
        reset_shared_store();
    }
}
