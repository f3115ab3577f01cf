//! Snapshot restoration.
//!
//! Restoring runs in two phases: a read-only plan comparing the
//! snapshot's resolved view against live disk, then an apply pass that
//! backs up affected paths, writes content verbatim and reapplies
//! recorded metadata. Per-file failures never abort the pass; rollback
//! is opt-in. Files on disk the snapshot does not know about are left
//! alone.

use crate::diff;
use crate::error::{SnapshotError, SnapshotResult};
use crate::model::{FileEntry, Snapshot, SnapshotId};
use crate::store::SnapshotStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use toolsnap_util::path as path_util;
use tracing::{debug, info, warn};

/// Impact level of applying a restore plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreRisk {
    /// Every target compared cleanly against disk.
    Low,
    /// At least one target could not be compared.
    Medium,
    /// Half or more of the targets could not be compared.
    High,
}

/// A target path the plan could not compare against disk.
#[derive(Debug, Clone)]
pub struct RestoreConflict {
    pub path: String,
    pub message: String,
}

/// Dry-run computation of what a restore would touch. Transient, never
/// persisted.
#[derive(Debug)]
pub struct RestorePlan {
    pub snapshot_id: SnapshotId,
    /// Paths absent from disk that the restore would create.
    pub to_create: Vec<String>,
    /// Paths whose on-disk bytes differ from the snapshot.
    pub to_modify: Vec<String>,
    /// Paths already matching the snapshot; the apply pass skips them.
    pub unchanged: Vec<String>,
    /// Paths that could not be compared. The apply pass does not write
    /// them; each becomes a recorded error instead.
    pub conflicts: Vec<RestoreConflict>,
    pub risk: RestoreRisk,
}

impl RestorePlan {
    /// Number of paths the apply pass would write.
    pub fn pending_writes(&self) -> usize {
        self.to_create.len() + self.to_modify.len()
    }
}

/// Knobs for an apply pass.
#[derive(Debug, Clone)]
pub struct RestoreOptions {
    /// Back up affected paths before the first write. Required when
    /// `rollback_on_failure` is set.
    pub backup: bool,

    /// Undo this restore's writes if any per-file failure occurred.
    pub rollback_on_failure: bool,

    /// Reapply recorded mtime and permission bits after writing.
    pub preserve_metadata: bool,
}

impl Default for RestoreOptions {
    fn default() -> Self {
        Self {
            backup: true,
            rollback_on_failure: false,
            preserve_metadata: true,
        }
    }
}

/// Outcome of an apply pass.
#[derive(Debug)]
pub struct RestoreResult {
    pub snapshot_id: SnapshotId,
    pub files_restored: u64,
    /// Targets skipped because disk already matched the snapshot.
    pub files_skipped: u64,
    /// Per-file failures, `path: message`.
    pub errors: Vec<String>,
    /// Whether a failed restore was undone from its backup.
    pub rolled_back: bool,
    /// Where the pre-restore backup was written, when enabled.
    pub backup_dir: Option<PathBuf>,
    /// True when every attempted write landed and nothing was undone.
    pub success: bool,
}

impl RestoreResult {
    /// Some writes landed, some failed, nothing was undone.
    pub fn is_partial(&self) -> bool {
        !self.success && !self.rolled_back && self.files_restored > 0
    }
}

/// On-disk record of what a backup contains, written next to the copied
/// files so a backup stays usable without the process that made it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BackupManifest {
    snapshot_id: String,
    created_at: Option<DateTime<Utc>>,
    base_path: PathBuf,
    /// Paths that existed before the restore, copied under `files/`.
    overwritten: Vec<String>,
    /// Paths the restore was about to create; rollback removes them.
    created: Vec<String>,
}

/// Stateless restore service. Construct once, reuse across snapshots.
pub struct RestoreEngine {
    backup_root: Option<PathBuf>,
}

impl RestoreEngine {
    /// Engine writing backups under the user data directory.
    pub fn new() -> Self {
        Self { backup_root: None }
    }

    /// Engine writing backups under a specific directory.
    pub fn with_backup_root(root: impl Into<PathBuf>) -> Self {
        Self {
            backup_root: Some(root.into()),
        }
    }

    /// Compute what restoring `snapshot` onto its base path would do,
    /// without mutating anything.
    pub async fn preview(
        &self,
        store: &dyn SnapshotStore,
        snapshot: &Snapshot,
    ) -> SnapshotResult<RestorePlan> {
        let resolved = diff::resolve_all(store, snapshot).await?;
        Ok(self.classify(snapshot, &resolved).await)
    }

    /// Apply `snapshot` onto its base path.
    ///
    /// A broken ancestor chain fails the whole operation before any
    /// mutation. Per-file write failures are recorded and the pass
    /// continues; with `rollback_on_failure` set, any failure triggers a
    /// restore of the pre-restore backup instead.
    pub async fn restore(
        &self,
        store: &dyn SnapshotStore,
        snapshot: &Snapshot,
        options: &RestoreOptions,
    ) -> SnapshotResult<RestoreResult> {
        if options.rollback_on_failure && !options.backup {
            return Err(SnapshotError::validation(
                "rollback_on_failure requires backup to be enabled",
            ));
        }

        // Resolve every entry up front so a broken chain fails with
        // nothing written.
        let resolved = diff::resolve_all(store, snapshot).await?;
        let plan = self.classify(snapshot, &resolved).await;

        let mut result = RestoreResult {
            snapshot_id: snapshot.id.clone(),
            files_restored: 0,
            files_skipped: plan.unchanged.len() as u64,
            errors: Vec::new(),
            rolled_back: false,
            backup_dir: None,
            success: false,
        };

        // Conflicted paths are never blind-written over state we could
        // not inspect
        for conflict in &plan.conflicts {
            warn!(path = %conflict.path, message = %conflict.message, "Conflicting restore target");
            result
                .errors
                .push(format!("{}: {}", conflict.path, conflict.message));
        }

        let targets: Vec<String> = plan
            .to_create
            .iter()
            .chain(plan.to_modify.iter())
            .cloned()
            .collect();

        if targets.is_empty() && result.errors.is_empty() {
            debug!(snapshot_id = %snapshot.id, "Nothing to restore");
            result.success = true;
            return Ok(result);
        }

        let mut manifest = BackupManifest {
            snapshot_id: snapshot.id.to_string(),
            created_at: Some(Utc::now()),
            base_path: snapshot.base_path.clone(),
            overwritten: Vec::new(),
            created: Vec::new(),
        };
        let backup_dir = if options.backup && !targets.is_empty() {
            Some(self.write_backup(snapshot, &targets, &mut manifest).await?)
        } else {
            None
        };

        for path in &targets {
            // resolve_all covered every active file, so the lookup holds
            let Some(bytes) = resolved.get(path) else {
                continue;
            };
            match self.write_file(snapshot, path, bytes, options).await {
                Ok(()) => result.files_restored += 1,
                Err(e) => {
                    warn!(path = %path, error = %e, "Failed to restore file");
                    result.errors.push(format!("{path}: {e}"));
                }
            }
        }

        if options.rollback_on_failure && !result.errors.is_empty() && !targets.is_empty() {
            warn!(
                snapshot_id = %snapshot.id,
                errors = result.errors.len(),
                "Restore failed, rolling back"
            );
            match backup_dir.as_deref() {
                Some(dir) => match self.rollback(snapshot, dir, &manifest).await {
                    Ok(()) => result.rolled_back = true,
                    Err(e) => result.errors.push(format!("rollback: {e}")),
                },
                None => result.errors.push("rollback: no backup available".to_string()),
            }
        }

        result.backup_dir = backup_dir;
        result.success = !result.rolled_back && result.errors.is_empty();

        info!(
            snapshot_id = %snapshot.id,
            files_restored = result.files_restored,
            files_skipped = result.files_skipped,
            errors = result.errors.len(),
            rolled_back = result.rolled_back,
            "Restore complete"
        );

        Ok(result)
    }

    /// Compare each resolved entry against live disk.
    async fn classify(
        &self,
        snapshot: &Snapshot,
        resolved: &BTreeMap<String, Vec<u8>>,
    ) -> RestorePlan {
        let mut plan = RestorePlan {
            snapshot_id: snapshot.id.clone(),
            to_create: Vec::new(),
            to_modify: Vec::new(),
            unchanged: Vec::new(),
            conflicts: Vec::new(),
            risk: RestoreRisk::Low,
        };

        for (path, target) in resolved {
            let Some(disk_path) = path_util::safe_join(&snapshot.base_path, Path::new(path))
            else {
                plan.conflicts.push(RestoreConflict {
                    path: path.clone(),
                    message: "escapes the restore root".to_string(),
                });
                continue;
            };
            match fs::read(&disk_path).await {
                Ok(disk) if &disk == target => plan.unchanged.push(path.clone()),
                Ok(_) => plan.to_modify.push(path.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    plan.to_create.push(path.clone());
                }
                Err(e) => plan.conflicts.push(RestoreConflict {
                    path: path.clone(),
                    message: e.to_string(),
                }),
            }
        }

        plan.risk = assess_risk(&plan);
        plan
    }

    /// Copy the current state of every target into a timestamped backup
    /// directory and write its manifest. Backup failures abort the
    /// restore; a half-taken backup must never sanction overwrites.
    async fn write_backup(
        &self,
        snapshot: &Snapshot,
        targets: &[String],
        manifest: &mut BackupManifest,
    ) -> SnapshotResult<PathBuf> {
        let root = match &self.backup_root {
            Some(root) => root.clone(),
            None => path_util::data_dir()
                .map(|dir| dir.join("backups"))
                .ok_or_else(|| {
                    SnapshotError::restore("No data directory available for backups")
                })?,
        };

        let stamp = Utc::now().format("%Y%m%d-%H%M%S%.3f");
        let backup_dir = root.join(format!("{stamp}-{}", snapshot.id));
        let files_dir = backup_dir.join("files");
        fs::create_dir_all(&files_dir).await?;

        for path in targets {
            let Some(src) = path_util::safe_join(&snapshot.base_path, Path::new(path)) else {
                continue;
            };
            let dst = files_dir.join(path);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent).await?;
            }
            match fs::copy(&src, &dst).await {
                Ok(_) => manifest.overwritten.push(path.clone()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    manifest.created.push(path.clone());
                }
                Err(e) => {
                    return Err(SnapshotError::restore(format!(
                        "Backup of {path} failed: {e}"
                    )));
                }
            }
        }

        let manifest_json = serde_json::to_string_pretty(manifest)?;
        fs::write(backup_dir.join("manifest.json"), manifest_json).await?;

        debug!(
            backup_dir = %backup_dir.display(),
            overwritten = manifest.overwritten.len(),
            created = manifest.created.len(),
            "Backup written"
        );
        Ok(backup_dir)
    }

    /// Write one resolved entry to disk, creating parents as needed.
    /// Zero-length content is written explicitly, never skipped.
    async fn write_file(
        &self,
        snapshot: &Snapshot,
        path: &str,
        bytes: &[u8],
        options: &RestoreOptions,
    ) -> SnapshotResult<()> {
        let Some(dst) = path_util::safe_join(&snapshot.base_path, Path::new(path)) else {
            return Err(SnapshotError::restore(format!(
                "{path} escapes the restore root"
            )));
        };
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&dst, bytes).await?;

        if options.preserve_metadata {
            if let Some(entry) = snapshot.files.get(path) {
                restore_metadata(&dst, entry);
            }
        }

        debug!(path = %path, "Restored");
        Ok(())
    }

    /// Put overwritten files back from the backup and remove files this
    /// restore created.
    async fn rollback(
        &self,
        snapshot: &Snapshot,
        backup_dir: &Path,
        manifest: &BackupManifest,
    ) -> SnapshotResult<()> {
        let files_dir = backup_dir.join("files");

        for path in &manifest.overwritten {
            let Some(dst) = path_util::safe_join(&snapshot.base_path, Path::new(path)) else {
                continue;
            };
            let src = files_dir.join(path);
            if let Some(parent) = dst.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::copy(&src, &dst).await.map_err(|e| {
                SnapshotError::restore(format!("Failed to roll back {path}: {e}"))
            })?;
        }

        for path in &manifest.created {
            let Some(dst) = path_util::safe_join(&snapshot.base_path, Path::new(path)) else {
                continue;
            };
            match fs::remove_file(&dst).await {
                Ok(()) => {}
                // Never written in the first place
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(SnapshotError::restore(format!(
                        "Failed to remove {path} during rollback: {e}"
                    )));
                }
            }
        }

        info!(backup_dir = %backup_dir.display(), "Rolled back restore");
        Ok(())
    }
}

impl Default for RestoreEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Any conflict lifts the risk to at least medium; conflicts covering
/// half or more of the targets lift it to high.
fn assess_risk(plan: &RestorePlan) -> RestoreRisk {
    if plan.conflicts.is_empty() {
        return RestoreRisk::Low;
    }
    let targets =
        plan.to_create.len() + plan.to_modify.len() + plan.unchanged.len() + plan.conflicts.len();
    if plan.conflicts.len() * 2 >= targets {
        RestoreRisk::High
    } else {
        RestoreRisk::Medium
    }
}

/// Best-effort reapplication of recorded permission bits and mtime.
/// Failures are logged, never surfaced; content already landed.
fn restore_metadata(dst: &Path, entry: &FileEntry) {
    #[cfg(unix)]
    if let Some(mode) = entry.mode {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(dst, std::fs::Permissions::from_mode(mode)) {
            debug!(path = %dst.display(), error = %e, "Could not restore permissions");
        }
    }

    if let Some(mtime) = entry.mtime {
        match std::fs::File::options().write(true).open(dst) {
            Ok(file) => {
                if let Err(e) = file.set_modified(SystemTime::from(mtime)) {
                    debug!(path = %dst.display(), error = %e, "Could not restore mtime");
                }
            }
            Err(e) => {
                debug!(path = %dst.display(), error = %e, "Could not reopen for mtime");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileAction, SnapshotKind, TriggerKind};
    use crate::store::MemoryStore;
    use std::fs as std_fs;
    use tempfile::tempdir;
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

    fn snapshot_at(base: &Path, entries: Vec<FileEntry>) -> Snapshot {
        let mut snapshot = Snapshot::new("restore test", TriggerKind::Manual, SnapshotKind::Full, base);
        snapshot.stats.total_files = entries.len() as u64;
        for entry in entries {
            snapshot.files.insert(entry.path.clone(), entry);
        }
        snapshot
    }

    #[tokio::test]
    async fn test_preview_classifies_targets() {
        let dir = tempdir().unwrap();
        std_fs::write(dir.path().join("same.txt"), "same").unwrap();
        std_fs::write(dir.path().join("edited.txt"), "old").unwrap();

        let snapshot = snapshot_at(
            dir.path(),
            vec![
                entry("same.txt", b"same"),
                entry("edited.txt", b"new"),
                entry("missing.txt", b"fresh"),
            ],
        );
        let store = MemoryStore::new();

        let plan = RestoreEngine::new()
            .preview(&store, &snapshot)
            .await
            .unwrap();

        assert_eq!(plan.unchanged, vec!["same.txt"]);
        assert_eq!(plan.to_modify, vec!["edited.txt"]);
        assert_eq!(plan.to_create, vec!["missing.txt"]);
        assert!(plan.conflicts.is_empty());
        assert_eq!(plan.risk, RestoreRisk::Low);
        assert_eq!(plan.pending_writes(), 2);
    }

    #[tokio::test]
    async fn test_restore_round_trip_including_empty_file() {
        let dir = tempdir().unwrap();
        let snapshot = snapshot_at(
            dir.path(),
            vec![entry("README.md", b"# Test\n\nMIT"), entry(".gitkeep", b"")],
        );
        let store = MemoryStore::new();

        // Mutate after the snapshot: edit one file, delete the other
        std_fs::write(dir.path().join("README.md"), "changed").unwrap();

        let result = RestoreEngine::with_backup_root(dir.path().join(".backups"))
            .restore(&store, &snapshot, &RestoreOptions::default())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(result.files_restored, 2);
        assert_eq!(
            std_fs::read(dir.path().join("README.md")).unwrap(),
            b"# Test\n\nMIT"
        );
        // Zero-length file exists with zero bytes, not missing
        let gitkeep = std_fs::metadata(dir.path().join(".gitkeep")).unwrap();
        assert_eq!(gitkeep.len(), 0);
    }

    #[tokio::test]
    async fn test_restore_creates_parent_directories() {
        let dir = tempdir().unwrap();
        let snapshot = snapshot_at(dir.path(), vec![entry("src/deep/mod.rs", b"pub fn f() {}")]);
        let store = MemoryStore::new();

        let result = RestoreEngine::with_backup_root(dir.path().join(".backups"))
            .restore(&store, &snapshot, &RestoreOptions::default())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(
            std_fs::read(dir.path().join("src/deep/mod.rs")).unwrap(),
            b"pub fn f() {}"
        );
    }

    #[tokio::test]
    async fn test_restore_never_deletes_extra_files() {
        let dir = tempdir().unwrap();
        std_fs::write(dir.path().join("tracked.txt"), "old").unwrap();
        std_fs::write(dir.path().join("extra.txt"), "added later").unwrap();

        let snapshot = snapshot_at(dir.path(), vec![entry("tracked.txt", b"snap")]);
        let store = MemoryStore::new();

        let result = RestoreEngine::with_backup_root(dir.path().join(".backups"))
            .restore(&store, &snapshot, &RestoreOptions::default())
            .await
            .unwrap();

        assert!(result.success);
        assert_eq!(
            std_fs::read(dir.path().join("extra.txt")).unwrap(),
            b"added later"
        );
    }

    #[tokio::test]
    async fn test_backup_captures_originals() {
        let dir = tempdir().unwrap();
        let backups = dir.path().join(".backups");
        std_fs::write(dir.path().join("a.txt"), "original").unwrap();

        let snapshot = snapshot_at(
            dir.path(),
            vec![entry("a.txt", b"restored"), entry("b.txt", b"created")],
        );
        let store = MemoryStore::new();

        let result = RestoreEngine::with_backup_root(&backups)
            .restore(&store, &snapshot, &RestoreOptions::default())
            .await
            .unwrap();

        let backup_dir = result.backup_dir.expect("backup directory");
        assert_eq!(
            std_fs::read(backup_dir.join("files/a.txt")).unwrap(),
            b"original"
        );

        let manifest: serde_json::Value = serde_json::from_str(
            &std_fs::read_to_string(backup_dir.join("manifest.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(manifest["overwritten"], serde_json::json!(["a.txt"]));
        assert_eq!(manifest["created"], serde_json::json!(["b.txt"]));
    }

    #[tokio::test]
    async fn test_rollback_undoes_writes() {
        let dir = tempdir().unwrap();
        std_fs::write(dir.path().join("a.txt"), "original").unwrap();

        // An escaping path is flagged as a conflict, which counts as a
        // failure and trips the rollback
        let snapshot = snapshot_at(
            dir.path(),
            vec![
                entry("a.txt", b"newval"),
                entry("b.txt", b"brand new"),
                entry("../escape.txt", b"x"),
            ],
        );
        let store = MemoryStore::new();

        let options = RestoreOptions {
            rollback_on_failure: true,
            ..Default::default()
        };
        let result = RestoreEngine::with_backup_root(dir.path().join(".backups"))
            .restore(&store, &snapshot, &options)
            .await
            .unwrap();

        assert!(!result.success);
        assert!(result.rolled_back);
        assert!(!result.errors.is_empty());
        // Overwritten file is back, created file is gone
        assert_eq!(std_fs::read(dir.path().join("a.txt")).unwrap(), b"original");
        assert!(!dir.path().join("b.txt").exists());
    }

    #[tokio::test]
    async fn test_rollback_requires_backup() {
        let dir = tempdir().unwrap();
        let snapshot = snapshot_at(dir.path(), vec![entry("a.txt", b"x")]);
        let store = MemoryStore::new();

        let options = RestoreOptions {
            backup: false,
            rollback_on_failure: true,
            ..Default::default()
        };
        let result = RestoreEngine::new()
            .restore(&store, &snapshot, &options)
            .await;

        assert!(matches!(result, Err(SnapshotError::Validation(_))));
    }

    #[tokio::test]
    async fn test_broken_chain_fails_before_mutation() {
        let dir = tempdir().unwrap();
        std_fs::write(dir.path().join("a.txt"), "current").unwrap();

        let mut unchanged = entry("a.txt", b"current");
        unchanged.action = FileAction::Unchanged;
        unchanged.content = None;
        let mut snapshot = snapshot_at(dir.path(), vec![unchanged]);
        snapshot.kind = SnapshotKind::Differential;
        snapshot.parent = Some(SnapshotId::from_string("snap_01hx5mz8qk3v9w2r4t6y8a0c2e"));
        let store = MemoryStore::new();

        let result = RestoreEngine::with_backup_root(dir.path().join(".backups"))
            .restore(&store, &snapshot, &RestoreOptions::default())
            .await;

        assert!(matches!(result, Err(SnapshotError::BrokenChain(_))));
        assert_eq!(std_fs::read(dir.path().join("a.txt")).unwrap(), b"current");
    }

    #[tokio::test]
    async fn test_risk_escalation() {
        let dir = tempdir().unwrap();
        // A directory where the snapshot expects a file is unreadable as
        // a file, producing a conflict
        std_fs::create_dir(dir.path().join("blocked.txt")).unwrap();
        std_fs::write(dir.path().join("x.txt"), "x").unwrap();
        std_fs::write(dir.path().join("y.txt"), "y").unwrap();

        let store = MemoryStore::new();
        let engine = RestoreEngine::new();

        let medium = snapshot_at(
            dir.path(),
            vec![
                entry("blocked.txt", b"data"),
                entry("x.txt", b"x"),
                entry("y.txt", b"y"),
            ],
        );
        let plan = engine.preview(&store, &medium).await.unwrap();
        assert_eq!(plan.conflicts.len(), 1);
        assert_eq!(plan.risk, RestoreRisk::Medium);

        let high = snapshot_at(dir.path(), vec![entry("blocked.txt", b"data")]);
        let plan = engine.preview(&store, &high).await.unwrap();
        assert_eq!(plan.risk, RestoreRisk::High);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_restore_reapplies_mode_and_mtime() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let mtime = Utc::now() - chrono::Duration::hours(3);
        let mut executable = entry("run.sh", b"#!/bin/sh\n");
        executable.mode = Some(0o100755);
        executable.mtime = Some(mtime);

        let snapshot = snapshot_at(dir.path(), vec![executable]);
        let store = MemoryStore::new();

        let result = RestoreEngine::with_backup_root(dir.path().join(".backups"))
            .restore(&store, &snapshot, &RestoreOptions::default())
            .await
            .unwrap();
        assert!(result.success);

        let metadata = std_fs::metadata(dir.path().join("run.sh")).unwrap();
        assert_eq!(metadata.permissions().mode() & 0o777, 0o755);

        let disk_mtime: DateTime<Utc> = metadata.modified().unwrap().into();
        assert!((disk_mtime - mtime).num_seconds().abs() <= 1);
    }
}
