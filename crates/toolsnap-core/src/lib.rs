//! Differential file snapshot engine.
//!
//! This crate captures point-in-time snapshots of a project tree and
//! restores them later:
//! - Filtered capture (include/exclude globs, size caps, binary detection)
//! - Differential encoding against the previous snapshot
//! - Chain-resolved content lookup and unified diffs
//! - Integrity validation of stored snapshots and their chains
//! - Planned, backed-up, rollback-capable restore
//! - Pluggable persistence with a process-wide shared store
//!
//! # Example
//!
//! ```no_run
//! use toolsnap_core::{ListOptions, SnapshotConfig, SnapshotManager, TriggerKind};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = SnapshotManager::new("/project/root", SnapshotConfig::default());
//!
//! // Checkpoint before a risky change
//! let snapshot = manager
//!     .create_snapshot("Before refactor", TriggerKind::Manual, Default::default())
//!     .await?;
//!
//! // ... edit files ...
//!
//! // Inspect and roll back if needed
//! let listed = manager.list_snapshots(&ListOptions::default()).await?;
//! assert_eq!(listed[0].id, snapshot.id);
//! manager
//!     .restore_snapshot(&snapshot.id, &Default::default())
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod diff;
pub mod error;
pub mod filter;
pub mod manager;
pub mod model;
pub mod notify;
pub mod restore;
pub mod store;
pub mod validate;

pub use capture::{CaptureOptions, CaptureOutcome, FileCapture};
pub use config::{
    InitialSnapshotConfig, RetentionConfig, SnapshotConfig, TriggerConfig,
};
pub use diff::DifferentialEncoder;
pub use error::{SnapshotError, SnapshotResult};
pub use filter::FileFilter;
pub use manager::{ListOptions, RestoreOutcome, RestoreRequest, SnapshotDetails, SnapshotManager};
pub use model::{
    CaptureIssue, CaptureStats, FileAction, FileEntry, Snapshot, SnapshotId, SnapshotKind,
    SnapshotMetadata, TriggerKind,
};
pub use notify::{SnapshotEvent, SnapshotNotifier};
pub use restore::{
    RestoreConflict, RestoreEngine, RestoreOptions, RestorePlan, RestoreResult, RestoreRisk,
};
pub use store::{
    init_shared_store, open_store, reset_shared_store, shared_store, JsonStore, MemoryStore,
    SnapshotStore, StoreBackend,
};
pub use validate::{IntegrityValidator, ValidationOutcome};
