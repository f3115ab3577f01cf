//! Snapshot integrity validation.
//!
//! Five advisory checks over a stored snapshot:
//! 1. Structure: id shape, kind/parent coherence, entry-key consistency.
//! 2. Content hashes: stored bytes match their recorded checksums.
//! 3. Self-containment: recorded sizes match stored content lengths.
//! 4. Checksum consistency: markers carry no payload and required
//!    checksums are present and well-formed.
//! 5. Metadata sanity: description, author and base path are usable.
//!
//! Validation judges the record as stored and never touches the
//! filesystem. [`IntegrityValidator::validate_chain`] additionally walks
//! the parent chain through a store.

use crate::config::SnapshotConfig;
use crate::error::SnapshotResult;
use crate::model::{FileAction, FileEntry, Snapshot, SnapshotId, SnapshotKind};
use crate::store::SnapshotStore;
use chrono::Utc;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;
use toolsnap_util::checksum;

/// Static regex for the snapshot id shape, compiled once.
static ID_REGEX: OnceLock<regex::Regex> = OnceLock::new();

/// Snapshot ids are `snap_` plus a 26-character lowercase Crockford
/// base32 ULID.
fn id_regex() -> &'static regex::Regex {
    ID_REGEX.get_or_init(|| {
        regex::Regex::new(r"^snap_[0-9a-hjkmnp-tv-z]{26}$")
            .expect("Invalid regex pattern - this is a compile-time constant")
    })
}

/// Result of validating a snapshot.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationOutcome {
    /// True when no errors were found; warnings do not affect validity.
    pub valid: bool,

    /// Problems that make the snapshot unsafe to restore from.
    pub errors: Vec<String>,

    /// Oddities worth surfacing that do not block use.
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    fn finish(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Validates stored snapshots against their own recorded invariants.
pub struct IntegrityValidator {
    require_checksums: bool,
    description_max_len: usize,
}

impl IntegrityValidator {
    /// Build a validator from configuration.
    pub fn new(config: &SnapshotConfig) -> Self {
        Self {
            require_checksums: config.require_checksums,
            description_max_len: config.description_max_len,
        }
    }

    /// Run every check against a single snapshot.
    pub fn validate(&self, snapshot: &Snapshot) -> ValidationOutcome {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        self.check_structure(snapshot, &mut errors, &mut warnings);
        self.check_content_hashes(snapshot, &mut errors);
        self.check_self_containment(snapshot, &mut errors);
        self.check_checksum_consistency(snapshot, &mut errors);
        self.check_metadata(snapshot, &mut errors, &mut warnings);

        ValidationOutcome::finish(errors, warnings)
    }

    /// Liveness-only check: id shape, non-blank description, a sane
    /// timestamp and kind/parent coherence. None of the full checks run,
    /// so this stays cheap enough for listing paths.
    pub fn quick_validate(&self, snapshot: &Snapshot) -> bool {
        id_regex().is_match(snapshot.id.as_str())
            && !snapshot.description.trim().is_empty()
            && snapshot.created_at.timestamp() > 0
            && !matches!(
                (snapshot.kind, &snapshot.parent),
                (SnapshotKind::Differential, None) | (SnapshotKind::Full, Some(_))
            )
    }

    /// Walk the parent chain through `store`, reporting missing parents,
    /// cycles, a non-full root and out-of-order timestamps.
    pub async fn validate_chain(
        &self,
        snapshot: &Snapshot,
        store: &dyn SnapshotStore,
    ) -> SnapshotResult<ValidationOutcome> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        let mut seen: HashSet<SnapshotId> = HashSet::new();
        seen.insert(snapshot.id.clone());

        let mut current = snapshot.clone();
        while let Some(parent_id) = current.parent.clone() {
            if !seen.insert(parent_id.clone()) {
                errors.push(format!("Chain contains a cycle at {parent_id}"));
                break;
            }
            match store.get(&parent_id).await? {
                Some(parent) => {
                    if current.created_at < parent.created_at {
                        warnings.push(format!(
                            "{} is older than its parent {}",
                            current.id, parent.id
                        ));
                    }
                    current = parent;
                }
                None => {
                    errors.push(format!("Missing parent {parent_id} of {}", current.id));
                    break;
                }
            }
        }

        if errors.is_empty() && current.kind != SnapshotKind::Full {
            errors.push(format!("Chain root {} is differential", current.id));
        }

        // With the chain itself intact, every unchanged entry must still
        // resolve to stored content somewhere up it.
        if errors.is_empty() {
            for (path, entry) in &snapshot.files {
                if entry.action != FileAction::Unchanged {
                    continue;
                }
                match crate::diff::resolve_content(store, snapshot, path).await {
                    Ok(Some(_)) => {}
                    Ok(None) => {
                        errors.push(format!("Unchanged entry {path} resolved to no content"));
                    }
                    Err(crate::error::SnapshotError::BrokenChain(message)) => {
                        errors.push(format!("Cannot resolve {path}: {message}"));
                    }
                    Err(other) => return Err(other),
                }
            }
        }

        Ok(ValidationOutcome::finish(errors, warnings))
    }

    fn check_structure(
        &self,
        snapshot: &Snapshot,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) {
        if !id_regex().is_match(snapshot.id.as_str()) {
            errors.push(format!("Snapshot id has invalid format: {}", snapshot.id));
        }

        match (snapshot.kind, &snapshot.parent) {
            (SnapshotKind::Differential, None) => {
                errors.push("Differential snapshot has no parent".to_string());
            }
            (SnapshotKind::Full, Some(parent)) => {
                errors.push(format!("Full snapshot must not have a parent (found {parent})"));
            }
            (_, Some(parent)) if !id_regex().is_match(parent.as_str()) => {
                errors.push(format!("Parent id has invalid format: {parent}"));
            }
            _ => {}
        }

        for (key, entry) in &snapshot.files {
            if key != &entry.path {
                errors.push(format!(
                    "Entry key {key} does not match its path {}",
                    entry.path
                ));
            }
        }

        if snapshot.files.is_empty() && snapshot.stats.total_files > 0 {
            errors.push(format!(
                "Stats report {} captured files but the snapshot has no entries",
                snapshot.stats.total_files
            ));
        }

        if snapshot.created_at > Utc::now() {
            warnings.push("Snapshot timestamp is in the future".to_string());
        }
    }

    fn check_content_hashes(&self, snapshot: &Snapshot, errors: &mut Vec<String>) {
        for entry in snapshot.files.values() {
            if !matches!(entry.action, FileAction::Added | FileAction::Modified) {
                continue;
            }
            match (&entry.content, &entry.checksum) {
                (Some(content), Some(expected)) => {
                    if !checksum::verify(expected, content) {
                        errors.push(format!("Checksum mismatch for {}", entry.path));
                    }
                }
                (None, _) => {
                    errors.push(format!(
                        "Entry {} has action {:?} but no stored content",
                        entry.path, entry.action
                    ));
                }
                // A missing checksum is the consistency check's finding.
                (Some(_), None) => {}
            }
        }
    }

    fn check_self_containment(&self, snapshot: &Snapshot, errors: &mut Vec<String>) {
        for entry in snapshot.files.values() {
            if let Some(content) = &entry.content {
                if entry.size != content.len() as u64 {
                    errors.push(format!(
                        "Size mismatch for {}: recorded {}, stored {}",
                        entry.path,
                        entry.size,
                        content.len()
                    ));
                }
            }
        }
    }

    fn check_checksum_consistency(&self, snapshot: &Snapshot, errors: &mut Vec<String>) {
        for entry in snapshot.files.values() {
            match entry.action {
                FileAction::Deleted => {
                    if entry.content.is_some() {
                        errors.push(format!("Deleted marker {} carries content", entry.path));
                    }
                    if entry.checksum.is_some() {
                        errors.push(format!("Deleted marker {} carries a checksum", entry.path));
                    }
                }
                FileAction::Unchanged => {
                    if entry.content.is_some() {
                        errors.push(format!("Unchanged entry {} carries content", entry.path));
                    }
                    self.check_checksum_field(entry, errors);
                }
                FileAction::Added | FileAction::Modified => {
                    self.check_checksum_field(entry, errors);
                }
            }
        }
    }

    fn check_checksum_field(&self, entry: &FileEntry, errors: &mut Vec<String>) {
        match &entry.checksum {
            Some(expected) => {
                if checksum::parse_digest(expected).is_none() {
                    errors.push(format!("Entry {} has a malformed checksum", entry.path));
                }
            }
            None => {
                if self.require_checksums {
                    errors.push(format!("Entry {} is missing a checksum", entry.path));
                }
            }
        }
    }

    fn check_metadata(
        &self,
        snapshot: &Snapshot,
        errors: &mut Vec<String>,
        warnings: &mut Vec<String>,
    ) {
        if snapshot.description.trim().is_empty() {
            errors.push("Snapshot description is blank".to_string());
        } else if snapshot.description.chars().count() > self.description_max_len {
            warnings.push(format!(
                "Description exceeds {} characters",
                self.description_max_len
            ));
        }

        if let Some(author) = &snapshot.metadata.author {
            if author.trim().is_empty() {
                warnings.push("Snapshot author is blank".to_string());
            }
        }

        if snapshot.base_path.as_os_str().is_empty() {
            errors.push("Snapshot base path is empty".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TriggerKind;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use toolsnap_util::HashAlgorithm;

    fn entry(path: &str, content: &[u8]) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            action: FileAction::Added,
            content: Some(content.to_vec()),
            size: content.len() as u64,
            checksum: Some(HashAlgorithm::Sha256.digest(content)),
            mtime: None,
            mode: None,
        }
    }

    fn full_snapshot() -> Snapshot {
        let mut snapshot = Snapshot::new("test snapshot", TriggerKind::Manual, SnapshotKind::Full, "/p");
        let e = entry("a.txt", b"hello");
        snapshot.files.insert(e.path.clone(), e);
        snapshot.stats.total_files = 1;
        snapshot.stats.total_size = 5;
        snapshot
    }

    fn validator() -> IntegrityValidator {
        IntegrityValidator::new(&SnapshotConfig::default())
    }

    #[test]
    fn test_valid_snapshot_passes() {
        let outcome = validator().validate(&full_snapshot());
        assert!(outcome.valid, "unexpected errors: {:?}", outcome.errors);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_malformed_id_rejected() {
        let mut snapshot = full_snapshot();
        snapshot.id = SnapshotId::from_string("snapshot-1");

        let outcome = validator().validate(&snapshot);
        assert!(!outcome.valid);
        assert!(outcome.errors.iter().any(|e| e.contains("invalid format")));

        // Uppercase ULIDs are not the stored form either
        snapshot.id = SnapshotId::from_string("snap_01ARZ3NDEKTSV4RRFFQ69G5FAV");
        assert!(!validator().validate(&snapshot).valid);
    }

    #[test]
    fn test_differential_requires_parent() {
        let mut snapshot = full_snapshot();
        snapshot.kind = SnapshotKind::Differential;

        let outcome = validator().validate(&snapshot);
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.contains("Differential snapshot has no parent")));
    }

    #[test]
    fn test_full_rejects_parent() {
        let snapshot = full_snapshot().with_parent(SnapshotId::new());
        let outcome = validator().validate(&snapshot);
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.contains("must not have a parent")));
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut snapshot = full_snapshot();
        if let Some(entry) = snapshot.files.get_mut("a.txt") {
            entry.content = Some(b"tampered-bytes-same-len?".to_vec());
            entry.size = entry.content.as_ref().map(|c| c.len() as u64).unwrap_or(0);
        }

        let outcome = validator().validate(&snapshot);
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.contains("Checksum mismatch for a.txt")));
    }

    #[test]
    fn test_size_mismatch_detected() {
        let mut snapshot = full_snapshot();
        if let Some(entry) = snapshot.files.get_mut("a.txt") {
            entry.size = 999;
        }

        let outcome = validator().validate(&snapshot);
        assert!(outcome.errors.iter().any(|e| e.contains("Size mismatch")));
    }

    #[test]
    fn test_deleted_marker_must_be_bare() {
        let mut snapshot = full_snapshot();
        let mut marker = FileEntry::deleted("gone.txt");
        marker.checksum = Some(HashAlgorithm::Sha256.digest(b"x"));
        snapshot.files.insert("gone.txt".to_string(), marker);

        let outcome = validator().validate(&snapshot);
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.contains("Deleted marker gone.txt carries a checksum")));
    }

    #[test]
    fn test_unchanged_must_not_carry_content() {
        let mut snapshot = full_snapshot();
        let mut unchanged = entry("b.txt", b"data");
        unchanged.action = FileAction::Unchanged;
        snapshot.files.insert("b.txt".to_string(), unchanged);

        let outcome = validator().validate(&snapshot);
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.contains("Unchanged entry b.txt carries content")));
    }

    #[test]
    fn test_missing_checksum_honors_config() {
        let mut snapshot = full_snapshot();
        if let Some(entry) = snapshot.files.get_mut("a.txt") {
            entry.checksum = None;
        }

        let strict = validator().validate(&snapshot);
        assert!(strict
            .errors
            .iter()
            .any(|e| e.contains("missing a checksum")));

        let relaxed_config = SnapshotConfig {
            require_checksums: false,
            ..Default::default()
        };
        let relaxed = IntegrityValidator::new(&relaxed_config).validate(&snapshot);
        assert!(relaxed.valid, "unexpected errors: {:?}", relaxed.errors);
    }

    #[test]
    fn test_blank_description_is_error() {
        let mut snapshot = full_snapshot();
        snapshot.description = "   ".to_string();

        let outcome = validator().validate(&snapshot);
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.contains("description is blank")));
    }

    #[test]
    fn test_future_timestamp_is_warning_only() {
        let mut snapshot = full_snapshot();
        snapshot.created_at = Utc::now() + Duration::hours(2);

        let outcome = validator().validate(&snapshot);
        assert!(outcome.valid);
        assert!(outcome
            .warnings
            .iter()
            .any(|w| w.contains("in the future")));
    }

    #[test]
    fn test_quick_validate() {
        let good = full_snapshot();
        assert!(validator().quick_validate(&good));

        let mut bad_kind = full_snapshot();
        bad_kind.kind = SnapshotKind::Differential;
        assert!(!validator().quick_validate(&bad_kind));

        let mut blank = full_snapshot();
        blank.description = "  ".to_string();
        assert!(!validator().quick_validate(&blank));

        // A checksum problem is not a liveness problem
        let mut tampered = full_snapshot();
        if let Some(entry) = tampered.files.get_mut("a.txt") {
            entry.checksum = Some("sha256:0000".to_string());
        }
        assert!(validator().quick_validate(&tampered));
    }

    #[tokio::test]
    async fn test_validate_chain_ok() {
        let store = MemoryStore::new();
        let base = full_snapshot();
        let mut unchanged = entry("a.txt", b"hello");
        unchanged.action = FileAction::Unchanged;
        unchanged.content = None;
        let mut child = Snapshot::new(
            "child",
            TriggerKind::Automatic,
            SnapshotKind::Differential,
            "/p",
        )
        .with_parent(base.id.clone());
        child.files.insert("a.txt".to_string(), unchanged);
        store.save(&base).await.unwrap();
        store.save(&child).await.unwrap();

        let outcome = validator().validate_chain(&child, &store).await.unwrap();
        assert!(outcome.valid, "unexpected errors: {:?}", outcome.errors);
    }

    #[tokio::test]
    async fn test_validate_chain_reports_unresolvable_entry() {
        let store = MemoryStore::new();
        let base = full_snapshot();
        let mut unchanged = entry("b.txt", b"ghost");
        unchanged.action = FileAction::Unchanged;
        unchanged.content = None;
        let mut child = Snapshot::new(
            "child",
            TriggerKind::Automatic,
            SnapshotKind::Differential,
            "/p",
        )
        .with_parent(base.id.clone());
        child.files.insert("b.txt".to_string(), unchanged);
        store.save(&base).await.unwrap();
        store.save(&child).await.unwrap();

        let outcome = validator().validate_chain(&child, &store).await.unwrap();
        assert!(!outcome.valid);
        assert!(outcome.errors.iter().any(|e| e.contains("b.txt")));
    }

    #[tokio::test]
    async fn test_validate_chain_missing_parent() {
        let store = MemoryStore::new();
        let child = Snapshot::new(
            "child",
            TriggerKind::Automatic,
            SnapshotKind::Differential,
            "/p",
        )
        .with_parent(SnapshotId::from_string("snap_01hx5mz8qk3v9w2r4t6y8a0c2e"));
        store.save(&child).await.unwrap();

        let outcome = validator().validate_chain(&child, &store).await.unwrap();
        assert!(!outcome.valid);
        assert!(outcome.errors.iter().any(|e| e.contains("Missing parent")));
    }

    #[tokio::test]
    async fn test_validate_chain_rejects_differential_root() {
        let store = MemoryStore::new();
        let mut root = full_snapshot();
        root.kind = SnapshotKind::Differential;
        root.parent = None;
        let child = Snapshot::new(
            "child",
            TriggerKind::Automatic,
            SnapshotKind::Differential,
            "/p",
        )
        .with_parent(root.id.clone());
        store.save(&root).await.unwrap();
        store.save(&child).await.unwrap();

        let outcome = validator().validate_chain(&child, &store).await.unwrap();
        assert!(outcome
            .errors
            .iter()
            .any(|e| e.contains("root") && e.contains("differential")));
    }

    #[tokio::test]
    async fn test_validate_chain_detects_cycle() {
        let store = MemoryStore::new();
        let mut a = full_snapshot();
        let mut b = full_snapshot();
        b.id = SnapshotId::new();
        a.kind = SnapshotKind::Differential;
        b.kind = SnapshotKind::Differential;
        a.parent = Some(b.id.clone());
        b.parent = Some(a.id.clone());
        store.save(&a).await.unwrap();
        store.save(&b).await.unwrap();

        let outcome = validator().validate_chain(&a, &store).await.unwrap();
        assert!(outcome.errors.iter().any(|e| e.contains("cycle")));
    }
}
