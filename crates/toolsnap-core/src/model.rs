//! Snapshot data structures.
//!
//! A [`Snapshot`] is an immutable, timestamped record of a directory's
//! eligible files. Full snapshots carry content for every entry;
//! differential snapshots carry content only for changed entries and
//! reference their parent for the rest.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use toolsnap_util::Identifier;

/// Unique identifier for a snapshot (`snap_<ulid>`).
///
/// Ascending ULIDs make lexicographic order match creation order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    /// Create a new snapshot ID.
    pub fn new() -> Self {
        Self(Identifier::snapshot())
    }

    /// Create a snapshot ID from a string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the ID as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SnapshotId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What caused a snapshot to be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerKind {
    /// Explicitly requested by a caller.
    Manual,
    /// Taken once when a project is first opened.
    Initial,
    /// Taken around a file-modifying tool execution.
    Automatic,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Manual => "manual",
            TriggerKind::Initial => "initial",
            TriggerKind::Automatic => "automatic",
        }
    }
}

/// How a snapshot encodes its file set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    /// Content stored for every captured file.
    Full,
    /// Content stored only for changed files; the rest reference the parent.
    Differential,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Full => "full",
            SnapshotKind::Differential => "differential",
        }
    }
}

/// Per-file change classification relative to the parent snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileAction {
    /// New since the parent (or part of a full snapshot).
    Added,
    /// Content changed since the parent.
    Modified,
    /// Present in the parent, gone now. Marker only, no content.
    Deleted,
    /// Identical to the parent. Content resolves through the chain.
    Unchanged,
}

/// Serialize optional raw bytes as a base64 string.
mod content_base64 {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded: Option<String> = Option::deserialize(deserializer)?;
        match encoded {
            Some(s) => STANDARD.decode(s).map(Some).map_err(serde::de::Error::custom),
            None => Ok(None),
        }
    }
}

/// A single file inside a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    /// Path relative to the snapshot base, forward-slash separated.
    pub path: String,

    /// Change classification relative to the parent snapshot.
    pub action: FileAction,

    /// Raw file bytes. Zero-length files carry `Some(vec![])`, never
    /// `None`; only unchanged and deleted markers omit content.
    #[serde(
        default,
        with = "content_base64",
        skip_serializing_if = "Option::is_none"
    )]
    pub content: Option<Vec<u8>>,

    /// File size in bytes at capture time.
    pub size: u64,

    /// Prefixed content digest, e.g. `sha256:9f86d081...`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,

    /// Modification time at capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<DateTime<Utc>>,

    /// Unix permission bits at capture.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

impl FileEntry {
    /// Whether this entry carries stored content.
    pub fn has_content(&self) -> bool {
        self.content.is_some()
    }

    /// Build a deleted marker for a path.
    pub fn deleted(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: FileAction::Deleted,
            content: None,
            size: 0,
            checksum: None,
            mtime: None,
            mode: None,
        }
    }
}

/// A per-file problem recorded during capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureIssue {
    /// Portable relative path of the affected file.
    pub path: String,
    /// Human-readable description of what went wrong.
    pub message: String,
}

/// Aggregate statistics for a capture pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureStats {
    /// Files included in the capture.
    pub total_files: u64,
    /// Sum of included file sizes in bytes.
    pub total_size: u64,
    /// Files and directories skipped by filtering or read failures.
    pub skipped_files: u64,
    /// Per-file failures that did not abort the capture.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<CaptureIssue>,
}

/// Contextual metadata attached to a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotMetadata {
    /// Name of the tool whose execution triggered this snapshot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Arguments the tool was invoked with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<serde_json::Value>,

    /// Paths the tool declared it was about to touch.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<String>,

    /// Session the snapshot belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Who requested the snapshot (manual snapshots).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// Free-form extension fields.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A snapshot of a directory's eligible files at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique identifier for this snapshot.
    pub id: SnapshotId,

    /// Description of why the snapshot was taken.
    pub description: String,

    /// When the snapshot was taken.
    pub created_at: DateTime<Utc>,

    /// What caused the snapshot.
    pub trigger: TriggerKind,

    /// Full or differential encoding.
    pub kind: SnapshotKind,

    /// Parent in the differential chain. Set iff `kind` is differential.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<SnapshotId>,

    /// Directory the snapshot was captured from.
    pub base_path: PathBuf,

    /// Files keyed by portable relative path (sorted).
    pub files: BTreeMap<String, FileEntry>,

    /// Capture statistics.
    #[serde(default)]
    pub stats: CaptureStats,

    /// Contextual metadata.
    #[serde(default)]
    pub metadata: SnapshotMetadata,
}

impl Snapshot {
    /// Create an empty snapshot shell; files and stats are filled in by
    /// the capture/encoding pipeline.
    pub fn new(
        description: impl Into<String>,
        trigger: TriggerKind,
        kind: SnapshotKind,
        base_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: SnapshotId::new(),
            description: description.into(),
            created_at: Utc::now(),
            trigger,
            kind,
            parent: None,
            base_path: base_path.into(),
            files: BTreeMap::new(),
            stats: CaptureStats::default(),
            metadata: SnapshotMetadata::default(),
        }
    }

    /// Set the parent snapshot for a differential chain.
    pub fn with_parent(mut self, parent: SnapshotId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Set the metadata for this snapshot.
    pub fn with_metadata(mut self, metadata: SnapshotMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check if this snapshot includes a specific path (deleted markers count).
    pub fn contains_file(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Entries that exist in this snapshot's view of the tree, i.e.
    /// everything except deleted markers.
    pub fn active_files(&self) -> impl Iterator<Item = (&String, &FileEntry)> {
        self.files
            .iter()
            .filter(|(_, entry)| entry.action != FileAction::Deleted)
    }

    /// Total bytes of content physically stored in this snapshot.
    ///
    /// Unchanged and deleted markers contribute nothing, which is what
    /// makes a no-change differential strictly smaller than its parent.
    pub fn stored_bytes(&self) -> u64 {
        self.files
            .values()
            .filter_map(|entry| entry.content.as_ref())
            .map(|content| content.len() as u64)
            .sum()
    }
}
