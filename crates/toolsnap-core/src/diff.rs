//! Differential snapshot encoding.
//!
//! Classifies captured entries against a parent snapshot:
//! - `Added` / `Modified` entries carry content.
//! - `Unchanged` entries drop content but keep size, checksum and mtime,
//!   so later classification never has to resolve the chain.
//! - `Deleted` markers record paths the parent had and the capture lacks.
//!
//! Content for unchanged entries resolves by walking the parent chain;
//! a chain that cannot produce promised content is a broken chain, which
//! is always an explicit error rather than a silent gap.

use crate::config::SnapshotConfig;
use crate::error::{SnapshotError, SnapshotResult};
use crate::model::{FileAction, FileEntry, Snapshot, SnapshotId, SnapshotKind};
use crate::store::SnapshotStore;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Encodes a captured file map as a full or differential snapshot.
pub struct DifferentialEncoder {
    differential: bool,
}

impl DifferentialEncoder {
    /// Build an encoder from configuration.
    pub fn new(config: &SnapshotConfig) -> Self {
        Self {
            differential: config.differential,
        }
    }

    /// Classify `captured` against an optional parent.
    ///
    /// Without a parent, or with differential encoding disabled, every
    /// entry stays `Added` with content and the result is a full
    /// snapshot.
    pub fn encode(
        &self,
        captured: BTreeMap<String, FileEntry>,
        parent: Option<&Snapshot>,
    ) -> (SnapshotKind, BTreeMap<String, FileEntry>) {
        let Some(parent) = parent.filter(|_| self.differential) else {
            return (SnapshotKind::Full, captured);
        };

        let mut files = BTreeMap::new();
        for (path, mut entry) in captured {
            match parent.files.get(&path) {
                Some(prev) if prev.action != FileAction::Deleted => {
                    if entries_match(prev, &entry) {
                        entry.action = FileAction::Unchanged;
                        entry.content = None;
                    } else {
                        entry.action = FileAction::Modified;
                    }
                }
                // Absent from the parent, or deleted there and recreated
                // since: a fresh entry either way.
                _ => {
                    entry.action = FileAction::Added;
                }
            }
            files.insert(path, entry);
        }

        for (path, _) in parent.active_files() {
            if !files.contains_key(path) {
                debug!(path = %path, "Recording deletion");
                files.insert(path.clone(), FileEntry::deleted(path.clone()));
            }
        }

        (SnapshotKind::Differential, files)
    }
}

/// Whether two captured entries describe identical content. Checksum
/// comparison when both sides have one, otherwise mtime+size; a missing
/// mtime counts as changed.
fn entries_match(prev: &FileEntry, current: &FileEntry) -> bool {
    match (&prev.checksum, &current.checksum) {
        (Some(a), Some(b)) => a == b,
        _ => prev.size == current.size && prev.mtime.is_some() && prev.mtime == current.mtime,
    }
}

/// Paths whose presence or content differs between two captured maps,
/// sorted. Empty means the two captures describe the same tree.
pub fn changed_paths(
    before: &BTreeMap<String, FileEntry>,
    after: &BTreeMap<String, FileEntry>,
) -> Vec<String> {
    let mut changed = Vec::new();
    for (path, entry) in after {
        match before.get(path) {
            Some(prev) if entries_match(prev, entry) => {}
            _ => changed.push(path.clone()),
        }
    }
    for path in before.keys() {
        if !after.contains_key(path) {
            changed.push(path.clone());
        }
    }
    changed.sort();
    changed
}

/// Resolve the bytes of `path` as seen by `snapshot`, following the
/// parent chain for unchanged entries.
///
/// `Ok(None)` means the snapshot's view has no such file (absent, or a
/// deletion marker). A chain that promises content it cannot produce
/// returns [`SnapshotError::BrokenChain`].
pub async fn resolve_content(
    store: &dyn SnapshotStore,
    snapshot: &Snapshot,
    path: &str,
) -> SnapshotResult<Option<Vec<u8>>> {
    let entry = match snapshot.files.get(path) {
        Some(entry) => entry,
        None => return Ok(None),
    };
    if entry.action == FileAction::Deleted {
        return Ok(None);
    }
    if entry.content.is_some() {
        return Ok(entry.content.clone());
    }

    // Content lives in an ancestor; walk up until stored bytes appear.
    let mut seen: HashSet<SnapshotId> = HashSet::new();
    seen.insert(snapshot.id.clone());
    let mut current_id = snapshot.id.clone();
    let mut parent_id = snapshot.parent.clone();
    loop {
        let Some(next_id) = parent_id else {
            return Err(SnapshotError::broken_chain(format!(
                "{current_id} holds no content for {path} and has no parent"
            )));
        };
        if !seen.insert(next_id.clone()) {
            return Err(SnapshotError::broken_chain(format!(
                "cycle detected at {next_id} while resolving {path}"
            )));
        }
        let parent = store.get(&next_id).await?.ok_or_else(|| {
            SnapshotError::broken_chain(format!(
                "parent {next_id} of {current_id} is missing from the store"
            ))
        })?;
        match parent.files.get(path) {
            Some(entry) if entry.action == FileAction::Deleted => {
                return Err(SnapshotError::broken_chain(format!(
                    "parent {next_id} marks {path} deleted but a descendant references it"
                )));
            }
            Some(entry) if entry.content.is_some() => {
                return Ok(entry.content.clone());
            }
            Some(_) => {
                current_id = next_id;
                parent_id = parent.parent.clone();
            }
            None => {
                return Err(SnapshotError::broken_chain(format!(
                    "parent {next_id} has no entry for {path}"
                )));
            }
        }
    }
}

/// Materialize the full content view of `snapshot`: every active file
/// mapped to its resolved bytes. Fails before returning anything partial
/// when the chain is broken.
pub async fn resolve_all(
    store: &dyn SnapshotStore,
    snapshot: &Snapshot,
) -> SnapshotResult<BTreeMap<String, Vec<u8>>> {
    let mut resolved = BTreeMap::new();
    for (path, _) in snapshot.active_files() {
        if let Some(bytes) = resolve_content(store, snapshot, path).await? {
            resolved.insert(path.clone(), bytes);
        }
    }
    Ok(resolved)
}
