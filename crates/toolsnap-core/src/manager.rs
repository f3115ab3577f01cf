//! Snapshot lifecycle orchestration.
//!
//! [`SnapshotManager`] wires capture, differential encoding, storage,
//! validation and restore into one surface. A manager is scoped to a
//! base directory; by default it persists through the process-wide
//! shared store so independently constructed managers observe the same
//! snapshot list.

use crate::capture::FileCapture;
use crate::config::SnapshotConfig;
use crate::diff::{self, DifferentialEncoder};
use crate::error::{SnapshotError, SnapshotResult};
use crate::model::{FileAction, Snapshot, SnapshotId, SnapshotKind, SnapshotMetadata, TriggerKind};
use crate::notify::{SnapshotEvent, SnapshotNotifier};
use crate::restore::{RestoreEngine, RestoreOptions, RestorePlan, RestoreResult};
use crate::store::{self, SnapshotStore};
use crate::validate::{IntegrityValidator, ValidationOutcome};
use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::json;
use similar::{ChangeTag, TextDiff};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use toolsnap_util::path as path_util;
use tracing::{debug, info, warn};

/// Filtering and pagination for snapshot listings.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only snapshots taken by this trigger.
    pub trigger: Option<TriggerKind>,
    /// At most this many entries, newest first.
    pub limit: Option<usize>,
}

/// How to run a restore.
#[derive(Debug, Clone, Default)]
pub struct RestoreRequest {
    /// Compute the plan only; mutate nothing.
    pub preview: bool,
    /// Apply-pass behavior, ignored in preview mode.
    pub options: RestoreOptions,
}

/// What a restore request produced.
#[derive(Debug)]
pub enum RestoreOutcome {
    /// The dry-run plan; disk was not touched.
    Preview(RestorePlan),
    /// The apply pass ran to completion.
    Applied(RestoreResult),
}

/// A snapshot together with derived inspection data.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotDetails {
    pub snapshot: Snapshot,
    pub files_added: usize,
    pub files_modified: usize,
    pub files_deleted: usize,
    pub files_unchanged: usize,
    /// Bytes of content physically stored by this snapshot.
    pub stored_bytes: u64,
    /// Result of the cheap liveness validation.
    pub quick_valid: bool,
}

/// Snapshot engine facade, scoped to one base directory.
pub struct SnapshotManager {
    config: SnapshotConfig,
    store: Arc<dyn SnapshotStore>,
    capture: FileCapture,
    encoder: DifferentialEncoder,
    validator: IntegrityValidator,
    restorer: RestoreEngine,
    notifier: SnapshotNotifier,
    base_path: PathBuf,
}

impl SnapshotManager {
    /// Manager persisting through the process-wide shared store.
    pub fn new(base_path: impl Into<PathBuf>, config: SnapshotConfig) -> Self {
        let store = store::shared_store();
        Self::with_store(base_path, config, store)
    }

    /// Manager persisting through an explicit store instance.
    pub fn with_store(
        base_path: impl Into<PathBuf>,
        config: SnapshotConfig,
        store: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            capture: FileCapture::new(&config),
            encoder: DifferentialEncoder::new(&config),
            validator: IntegrityValidator::new(&config),
            restorer: RestoreEngine::new(),
            notifier: SnapshotNotifier::new(),
            base_path: base_path.into(),
            config,
            store,
        }
    }

    /// Replace the restore engine, e.g. to redirect pre-restore backups.
    pub fn with_restore_engine(mut self, restorer: RestoreEngine) -> Self {
        self.restorer = restorer;
        self
    }

    pub fn config(&self) -> &SnapshotConfig {
        &self.config
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub fn notifier(&self) -> &SnapshotNotifier {
        &self.notifier
    }

    /// Mutable access for listener registration.
    pub fn notifier_mut(&mut self) -> &mut SnapshotNotifier {
        &mut self.notifier
    }

    /// Capture the base directory into a new snapshot.
    ///
    /// Encodes differentially against the latest prior snapshot of the
    /// same base directory when differential encoding is enabled. Blank
    /// descriptions are rejected; overlong ones are truncated.
    pub async fn create_snapshot(
        &self,
        description: &str,
        trigger: TriggerKind,
        metadata: SnapshotMetadata,
    ) -> SnapshotResult<Snapshot> {
        let description = description.trim();
        if description.is_empty() {
            return Err(SnapshotError::validation(
                "Snapshot description cannot be empty",
            ));
        }
        let description: String = if description.chars().count() > self.config.description_max_len
        {
            warn!(
                limit = self.config.description_max_len,
                "Truncating overlong snapshot description"
            );
            description
                .chars()
                .take(self.config.description_max_len)
                .collect()
        } else {
            description.to_string()
        };

        let outcome = self.capture.capture(&self.base_path).await?;

        // Latest prior snapshot of the same tree anchors the differential
        let parent = self
            .store
            .list()
            .await?
            .into_iter()
            .find(|s| s.base_path == self.base_path);
        let (kind, files) = self.encoder.encode(outcome.files, parent.as_ref());

        let mut snapshot =
            Snapshot::new(description, trigger, kind, &self.base_path).with_metadata(metadata);
        if kind == SnapshotKind::Differential {
            if let Some(parent) = &parent {
                snapshot = snapshot.with_parent(parent.id.clone());
            }
        }
        snapshot.files = files;
        snapshot.stats = outcome.stats;

        self.store.save(&snapshot).await?;
        info!(
            snapshot_id = %snapshot.id,
            kind = kind.as_str(),
            trigger = snapshot.trigger.as_str(),
            files = snapshot.stats.total_files,
            "Created snapshot"
        );

        if self.config.retention.auto_cleanup {
            if let Err(e) = self.cleanup(false).await {
                warn!(error = %e, "Automatic cleanup failed");
            }
        }

        self.notifier.emit(
            SnapshotEvent::Created,
            &json!({
                "id": snapshot.id.as_str(),
                "description": snapshot.description,
                "kind": kind.as_str(),
                "trigger": snapshot.trigger.as_str(),
                "files": snapshot.stats.total_files,
            }),
        );

        Ok(snapshot)
    }

    /// List snapshots, newest first.
    pub async fn list_snapshots(&self, options: &ListOptions) -> SnapshotResult<Vec<Snapshot>> {
        let mut snapshots = self.store.list().await?;
        if let Some(trigger) = &options.trigger {
            snapshots.retain(|s| &s.trigger == trigger);
        }
        if let Some(limit) = options.limit {
            snapshots.truncate(limit);
        }
        Ok(snapshots)
    }

    /// Fetch a snapshot by id.
    pub async fn get_snapshot(&self, id: &SnapshotId) -> SnapshotResult<Option<Snapshot>> {
        self.store.get(id).await
    }

    /// Fetch a snapshot along with derived counts and a liveness check.
    pub async fn get_snapshot_details(&self, id: &SnapshotId) -> SnapshotResult<SnapshotDetails> {
        let snapshot = self.require(id).await?;

        let mut added = 0;
        let mut modified = 0;
        let mut deleted = 0;
        let mut unchanged = 0;
        for entry in snapshot.files.values() {
            match entry.action {
                FileAction::Added => added += 1,
                FileAction::Modified => modified += 1,
                FileAction::Deleted => deleted += 1,
                FileAction::Unchanged => unchanged += 1,
            }
        }

        Ok(SnapshotDetails {
            stored_bytes: snapshot.stored_bytes(),
            quick_valid: self.validator.quick_validate(&snapshot),
            files_added: added,
            files_modified: modified,
            files_deleted: deleted,
            files_unchanged: unchanged,
            snapshot,
        })
    }

    /// Restore a snapshot onto its base directory, or preview the plan.
    pub async fn restore_snapshot(
        &self,
        id: &SnapshotId,
        request: &RestoreRequest,
    ) -> SnapshotResult<RestoreOutcome> {
        let snapshot = self.require(id).await?;

        if request.preview {
            let plan = self.restorer.preview(self.store.as_ref(), &snapshot).await?;
            debug!(
                snapshot_id = %id,
                pending = plan.pending_writes(),
                conflicts = plan.conflicts.len(),
                "Computed restore plan"
            );
            return Ok(RestoreOutcome::Preview(plan));
        }

        let result = self
            .restorer
            .restore(self.store.as_ref(), &snapshot, &request.options)
            .await?;

        self.notifier.emit(
            SnapshotEvent::Restored,
            &json!({
                "id": id.as_str(),
                "files_restored": result.files_restored,
                "files_skipped": result.files_skipped,
                "rolled_back": result.rolled_back,
                "success": result.success,
            }),
        );

        Ok(RestoreOutcome::Applied(result))
    }

    /// Delete a snapshot. Returns whether a record existed.
    pub async fn delete_snapshot(&self, id: &SnapshotId) -> SnapshotResult<bool> {
        let dependents = self
            .store
            .list()
            .await?
            .iter()
            .filter(|s| s.parent.as_ref() == Some(id))
            .count();
        if dependents > 0 {
            warn!(
                snapshot_id = %id,
                dependents,
                "Deleting a snapshot that differential snapshots build on"
            );
        }

        let deleted = self.store.delete(id).await?;
        if deleted {
            info!(snapshot_id = %id, "Deleted snapshot");
            self.notifier
                .emit(SnapshotEvent::Deleted, &json!({"id": id.as_str()}));
        }
        Ok(deleted)
    }

    /// Render a unified diff between a snapshot's content for `path` and
    /// the live file. Either side may be absent and diffs as empty.
    pub async fn diff_file(&self, id: &SnapshotId, path: &str) -> SnapshotResult<String> {
        let snapshot = self.require(id).await?;
        let old_bytes = diff::resolve_content(self.store.as_ref(), &snapshot, path)
            .await?
            .unwrap_or_default();

        let live_bytes = match path_util::safe_join(&snapshot.base_path, Path::new(path)) {
            Some(disk_path) => fs::read(&disk_path).await.unwrap_or_default(),
            None => Vec::new(),
        };

        let old_text = String::from_utf8_lossy(&old_bytes);
        let new_text = String::from_utf8_lossy(&live_bytes);
        Ok(generate_diff(&old_text, &new_text, path))
    }

    /// Run the full integrity validation for one snapshot.
    pub async fn validate(&self, id: &SnapshotId) -> SnapshotResult<ValidationOutcome> {
        let snapshot = self.require(id).await?;
        Ok(self.validator.validate(&snapshot))
    }

    /// Validate a snapshot together with its ancestor chain.
    pub async fn validate_chain(&self, id: &SnapshotId) -> SnapshotResult<ValidationOutcome> {
        let snapshot = self.require(id).await?;
        self.validator
            .validate_chain(&snapshot, self.store.as_ref())
            .await
    }

    /// Apply retention rules, deleting snapshots past the age or count
    /// limits. Parents that surviving differential snapshots resolve
    /// through are retained unless `force` is set. Returns the number
    /// deleted.
    pub async fn cleanup(&self, force: bool) -> SnapshotResult<u32> {
        let snapshots = self.store.list().await?;
        let cutoff = Utc::now() - Duration::days(self.config.retention.max_age_days as i64);
        let max = self.config.retention.max_snapshots as usize;

        let mut doomed: HashSet<SnapshotId> = snapshots
            .iter()
            .filter(|s| s.created_at < cutoff)
            .map(|s| s.id.clone())
            .collect();

        // Count cap applies to whatever the age rule left, newest kept
        let survivors: Vec<&Snapshot> = snapshots
            .iter()
            .filter(|s| !doomed.contains(&s.id))
            .collect();
        if survivors.len() > max {
            for snapshot in &survivors[max..] {
                doomed.insert(snapshot.id.clone());
            }
        }

        if !force {
            // A doomed parent that a surviving snapshot resolves through
            // must stay, and so must its own ancestors
            loop {
                let rescued: Vec<SnapshotId> = snapshots
                    .iter()
                    .filter(|s| !doomed.contains(&s.id))
                    .filter_map(|s| s.parent.clone())
                    .filter(|parent| doomed.contains(parent))
                    .collect();
                if rescued.is_empty() {
                    break;
                }
                for parent in rescued {
                    debug!(snapshot_id = %parent, "Retaining live parent during cleanup");
                    doomed.remove(&parent);
                }
            }
        }

        let mut deleted = 0;
        for snapshot in snapshots.iter().rev() {
            if !doomed.contains(&snapshot.id) {
                continue;
            }
            match self.store.delete(&snapshot.id).await {
                Ok(true) => {
                    deleted += 1;
                    self.notifier.emit(
                        SnapshotEvent::Deleted,
                        &json!({"id": snapshot.id.as_str()}),
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(snapshot_id = %snapshot.id, error = %e, "Failed to delete old snapshot");
                }
            }
        }

        if deleted > 0 {
            info!(deleted, "Cleaned up old snapshots");
        }
        Ok(deleted)
    }

    async fn require(&self, id: &SnapshotId) -> SnapshotResult<Snapshot> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| SnapshotError::NotFound(id.to_string()))
    }
}

/// Generate a unified diff between two strings.
fn generate_diff(old: &str, new: &str, path: &str) -> String {
    let diff = TextDiff::from_lines(old, new);
    let mut output = String::new();

    output.push_str(&format!("--- a/{path}\n"));
    output.push_str(&format!("+++ b/{path}\n"));

    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 {
            output.push_str("...\n");
        }

        for op in group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => "-",
                    ChangeTag::Insert => "+",
                    ChangeTag::Equal => " ",
                };

                output.push_str(sign);
                output.push_str(change.value());
                if !change.value().ends_with('\n') {
                    output.push('\n');
                }
            }
        }
    }

    output
}
