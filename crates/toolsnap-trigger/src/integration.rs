//! Snapshot triggering around tool executions.
//!
//! [`SnapshotIntegration`] sits between a tool-execution loop and the
//! snapshot engine: file-modifying tool calls get a pre-state snapshot,
//! completions compare the post state against it and discard no-op
//! snapshots, and application startup takes a one-time initial snapshot
//! per project. Nothing here may fail the tool path; every snapshot
//! problem degrades to "no snapshot" with a log line.

use crate::classify::ToolCatalog;
use crate::tracker::{ExecutionPhase, ExecutionRecord, ExecutionTracker};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use toolsnap_core::{
    diff, CaptureOptions, FileCapture, FileEntry, SnapshotId, SnapshotManager, SnapshotMetadata,
    SnapshotResult, TriggerKind,
};
use toolsnap_util::checksum::{self, HashAlgorithm};
use toolsnap_util::path as path_util;
use tracing::{debug, info, warn};

/// A tool invocation about to run.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Host-assigned id, unique per invocation.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The completed execution, as far as triggering cares.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    pub success: bool,
}

/// Ambient state for trigger decisions.
#[derive(Debug, Clone)]
pub struct TriggerContext {
    pub session_id: String,
    /// Project root the snapshots cover.
    pub base_path: PathBuf,
    /// Signalled when the surrounding operation is being torn down.
    pub cancel: CancellationToken,
}

impl TriggerContext {
    pub fn new(session_id: impl Into<String>, base_path: impl Into<PathBuf>) -> Self {
        Self {
            session_id: session_id.into(),
            base_path: base_path.into(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Connects tool execution to the snapshot engine.
pub struct SnapshotIntegration {
    manager: SnapshotManager,
    catalog: ToolCatalog,
    tracker: ExecutionTracker,
    /// When the last automatic snapshot was taken, for the cooldown.
    last_auto: Mutex<Option<Instant>>,
    /// Automatic snapshots taken this session.
    session_count: AtomicU32,
    /// Directory holding per-project initial-snapshot markers.
    marker_dir: Option<PathBuf>,
}

impl SnapshotIntegration {
    /// Integration with the builtin tool catalog and the default marker
    /// directory under the user data dir.
    pub fn new(manager: SnapshotManager) -> Self {
        Self {
            manager,
            catalog: ToolCatalog::with_builtins(),
            tracker: ExecutionTracker::new(),
            last_auto: Mutex::new(None),
            session_count: AtomicU32::new(0),
            marker_dir: path_util::data_dir().map(|dir| dir.join("initial-markers")),
        }
    }

    /// Replace the tool catalog.
    pub fn with_catalog(mut self, catalog: ToolCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Store initial-snapshot markers under a specific directory.
    pub fn with_marker_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.marker_dir = Some(dir.into());
        self
    }

    pub fn manager(&self) -> &SnapshotManager {
        &self.manager
    }

    pub fn tracker(&self) -> &ExecutionTracker {
        &self.tracker
    }

    /// Forget session-scoped throttling state.
    pub fn reset_session(&self) {
        self.session_count.store(0, Ordering::Relaxed);
        *self.last_auto.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Called before a tool executes. Takes a pre-state snapshot for
    /// file-modifying tools and starts tracking the call.
    ///
    /// Returns the snapshot id, or `None` when no snapshot applies —
    /// read-only tool, throttled, disabled, cancelled, or failed.
    pub async fn on_tool_execution(
        &self,
        call: &ToolCall,
        ctx: &TriggerContext,
    ) -> Option<SnapshotId> {
        let config = self.manager.config();
        if !config.enabled || !config.trigger.auto_snapshot {
            return None;
        }
        if !self.catalog.is_modifying(&call.name) {
            debug!(tool = %call.name, "Read-only tool, no snapshot");
            return None;
        }
        if ctx.cancel.is_cancelled() {
            debug!(tool = %call.name, "Cancelled before capture, no snapshot");
            return None;
        }
        if !self.pass_throttle() {
            return None;
        }

        if self
            .tracker
            .begin(&call.id, &call.name, call.arguments.clone())
            .is_some()
        {
            debug!(tool_call_id = %call.id, "Displaced a stale execution record");
        }

        let targets = self.catalog.targets(&call.name, &call.arguments);
        let description = describe(&call.name, &targets);
        let metadata = SnapshotMetadata {
            tool_name: Some(call.name.clone()),
            tool_args: Some(call.arguments.clone()),
            targets,
            session_id: Some(ctx.session_id.clone()),
            ..Default::default()
        };

        match self
            .manager
            .create_snapshot(&description, TriggerKind::Automatic, metadata)
            .await
        {
            Ok(snapshot) => {
                self.tracker.attach_snapshot(&call.id, snapshot.id.clone());
                self.tracker.advance(&call.id, ExecutionPhase::Executing);
                self.note_auto_snapshot();
                debug!(
                    snapshot_id = %snapshot.id,
                    tool = %call.name,
                    "Captured pre-execution snapshot"
                );
                Some(snapshot.id)
            }
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Pre-execution snapshot failed");
                self.tracker.finish(&call.id);
                None
            }
        }
    }

    /// Called after a tool execution finishes, successfully or not.
    ///
    /// Compares the post state against the pre-state snapshot and
    /// discards it when nothing actually changed. The tracking entry is
    /// cleared on every path.
    pub async fn on_execution_complete(&self, tool_call_id: &str, outcome: &ToolOutcome) {
        let Some(record) = self.tracker.get(tool_call_id) else {
            return;
        };

        let result = self.settle(&record, outcome).await;
        self.tracker.finish(tool_call_id);

        if let Err(e) = result {
            warn!(
                tool_call_id = %tool_call_id,
                error = %e,
                "Post-execution snapshot comparison failed"
            );
        }
    }

    /// Called once per application startup. Takes the one-time initial
    /// snapshot for a project, bounded by the configured timeout.
    pub async fn on_application_start(&self, ctx: &TriggerContext) -> Option<SnapshotId> {
        let config = self.manager.config();
        if !config.enabled || !config.trigger.initial.enabled {
            return None;
        }

        let project_path = fs::canonicalize(&ctx.base_path)
            .await
            .unwrap_or_else(|_| ctx.base_path.clone());
        let Some(marker) = self.marker_path(&project_path) else {
            warn!("No data directory for initial-snapshot markers, skipping");
            return None;
        };
        if fs::try_exists(&marker).await.unwrap_or(false) {
            debug!(project = %project_path.display(), "Initial snapshot already taken");
            return None;
        }

        let budget = Duration::from_secs(config.trigger.initial.timeout_secs);
        let metadata = SnapshotMetadata {
            session_id: Some(ctx.session_id.clone()),
            ..Default::default()
        };
        let attempt =
            self.manager
                .create_snapshot("Initial project snapshot", TriggerKind::Initial, metadata);

        match tokio::time::timeout(budget, attempt).await {
            Ok(Ok(snapshot)) => {
                self.write_marker(&marker, &project_path, &snapshot.id).await;
                info!(snapshot_id = %snapshot.id, "Took initial project snapshot");
                Some(snapshot.id)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Initial snapshot failed");
                None
            }
            Err(_) => {
                warn!(
                    timeout_secs = config.trigger.initial.timeout_secs,
                    "Initial snapshot timed out"
                );
                None
            }
        }
    }

    /// Decide whether the pre-state snapshot stays.
    async fn settle(&self, record: &ExecutionRecord, outcome: &ToolOutcome) -> SnapshotResult<()> {
        let Some(snapshot_id) = &record.snapshot_id else {
            return Ok(());
        };

        let config = self.manager.config();
        if !config.trigger.require_actual_changes {
            self.tracker
                .advance(&record.tool_call_id, ExecutionPhase::Committed);
            return Ok(());
        }

        self.tracker
            .advance(&record.tool_call_id, ExecutionPhase::CapturingPostState);
        let Some(pre) = self.manager.get_snapshot(snapshot_id).await? else {
            return Ok(());
        };

        // Hashes are enough to detect change; skip content retention
        let capture = FileCapture::new(config);
        let post = capture
            .capture_with(&pre.base_path, &CaptureOptions {
                include_content: false,
            })
            .await?;

        self.tracker
            .advance(&record.tool_call_id, ExecutionPhase::Comparing);
        let before: BTreeMap<String, FileEntry> = pre
            .active_files()
            .map(|(path, entry)| (path.clone(), entry.clone()))
            .collect();
        let changed = diff::changed_paths(&before, &post.files);

        if changed.is_empty() {
            debug!(
                snapshot_id = %snapshot_id,
                tool = %record.tool_name,
                success = outcome.success,
                "No actual changes, discarding pre-state snapshot"
            );
            self.manager.delete_snapshot(snapshot_id).await?;
            self.tracker
                .advance(&record.tool_call_id, ExecutionPhase::Discarded);
        } else {
            debug!(
                snapshot_id = %snapshot_id,
                tool = %record.tool_name,
                changed = changed.len(),
                success = outcome.success,
                "Committing pre-state snapshot"
            );
            self.tracker
                .advance(&record.tool_call_id, ExecutionPhase::Committed);
        }
        Ok(())
    }

    fn pass_throttle(&self) -> bool {
        let trigger = &self.manager.config().trigger;

        if self.session_count.load(Ordering::Relaxed) >= trigger.max_per_session {
            debug!(
                max_per_session = trigger.max_per_session,
                "Session snapshot limit reached"
            );
            return false;
        }

        let last = self.last_auto.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(last) = *last {
            if last.elapsed() < Duration::from_secs(trigger.cooldown_secs) {
                debug!(
                    cooldown_secs = trigger.cooldown_secs,
                    "Cooldown active, skipping automatic snapshot"
                );
                return false;
            }
        }
        true
    }

    fn note_auto_snapshot(&self) {
        *self.last_auto.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        self.session_count.fetch_add(1, Ordering::Relaxed);
    }

    fn marker_path(&self, project_path: &Path) -> Option<PathBuf> {
        let dir = self.marker_dir.as_ref()?;
        let digest = HashAlgorithm::Sha256.digest(project_path.to_string_lossy().as_bytes());
        let hex = checksum::parse_digest(&digest)
            .map(|(_, hex)| hex.to_string())
            .unwrap_or(digest);
        Some(dir.join(format!("{hex}.json")))
    }

    /// Marker write failures downgrade idempotence to per-startup, which
    /// is tolerable; they never fail the startup path.
    async fn write_marker(&self, marker: &Path, project_path: &Path, snapshot_id: &SnapshotId) {
        let payload = serde_json::json!({
            "project_path": project_path,
            "snapshot_id": snapshot_id.as_str(),
            "created_at": chrono::Utc::now(),
        });

        let write = async {
            if let Some(parent) = marker.parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::write(marker, payload.to_string()).await
        };
        if let Err(e) = write.await {
            warn!(error = %e, "Could not write initial-snapshot marker");
        }
    }
}

fn describe(tool: &str, targets: &[String]) -> String {
    if targets.is_empty() {
        format!("Before {tool}")
    } else {
        format!("Before {tool}: {}", targets.join(", "))
    }
}
