//! Snapshot engine configuration.
//!
//! All settings have working defaults, so `SnapshotConfig::default()` is
//! a usable configuration. Hosts typically deserialize this from their
//! own config file and hand it to [`crate::SnapshotManager`].

use crate::store::StoreBackend;
use serde::{Deserialize, Serialize};
use toolsnap_util::HashAlgorithm;

/// Default exclusion globs: dependency dirs, VCS metadata, build output,
/// editor state, and transient files.
pub fn default_excludes() -> Vec<String> {
    [
        "node_modules/**",
        ".git/**",
        ".svn/**",
        ".hg/**",
        "target/**",
        "dist/**",
        "build/**",
        "out/**",
        "vendor/**",
        "__pycache__/**",
        ".venv/**",
        "venv/**",
        ".idea/**",
        ".vscode/**",
        "*.log",
        "*.tmp",
        "*.swp",
        ".DS_Store",
        "Thumbs.db",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Top-level snapshot configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    /// Whether snapshotting is enabled at all.
    pub enabled: bool,

    /// Globs that force-include matching paths, overriding every other rule.
    pub include: Vec<String>,

    /// Globs that exclude matching paths.
    pub exclude: Vec<String>,

    /// Per-file size cap in bytes; larger files are skipped, never truncated.
    pub max_file_size: u64,

    /// Content hash algorithm for stored entries.
    pub hash_algorithm: HashAlgorithm,

    /// Whether every stored non-deleted entry must carry a checksum.
    pub require_checksums: bool,

    /// Encode against the previous snapshot when one exists.
    pub differential: bool,

    /// Storage backend selection.
    pub backend: StoreBackend,

    /// Longest accepted description; longer ones are truncated.
    pub description_max_len: usize,

    /// Retention rules applied by cleanup.
    pub retention: RetentionConfig,

    /// Automatic trigger behavior.
    pub trigger: TriggerConfig,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include: Vec::new(),
            exclude: default_excludes(),
            max_file_size: 10 * 1024 * 1024,
            hash_algorithm: HashAlgorithm::Sha256,
            require_checksums: true,
            differential: true,
            backend: StoreBackend::Memory,
            description_max_len: 500,
            retention: RetentionConfig::default(),
            trigger: TriggerConfig::default(),
        }
    }
}

/// Retention rules for stored snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Maximum age of snapshots in days.
    pub max_age_days: u32,

    /// Maximum number of snapshots kept in the store.
    pub max_snapshots: u32,

    /// Whether to run cleanup automatically after each create.
    pub auto_cleanup: bool,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            max_age_days: 30,
            max_snapshots: 100,
            auto_cleanup: true,
        }
    }
}

/// Automatic snapshot trigger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Snapshot automatically before file-modifying tool executions.
    pub auto_snapshot: bool,

    /// Discard the pre-state snapshot when the execution changed nothing.
    pub require_actual_changes: bool,

    /// Minimum seconds between automatic snapshots.
    pub cooldown_secs: u64,

    /// Maximum automatic snapshots per session.
    pub max_per_session: u32,

    /// Initial snapshot on project startup.
    pub initial: InitialSnapshotConfig,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            auto_snapshot: true,
            require_actual_changes: true,
            cooldown_secs: 5,
            max_per_session: 100,
            initial: InitialSnapshotConfig::default(),
        }
    }
}

/// Initial-snapshot-on-startup configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitialSnapshotConfig {
    /// Take one snapshot when a project is opened for the first time.
    pub enabled: bool,

    /// Budget in seconds; on timeout startup continues without a snapshot.
    pub timeout_secs: u64,
}

impl Default for InitialSnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: 10,
        }
    }
}
