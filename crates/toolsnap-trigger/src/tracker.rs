//! Per-tool-call execution tracking.
//!
//! Each tracked tool call moves through a small lifecycle while its
//! pre-state snapshot is captured, the tool runs, and the post-state is
//! compared. The tracker holds at most one record per tool-call id, and
//! every completion path removes it.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use toolsnap_core::SnapshotId;
use tracing::warn;

/// Lifecycle phases of a tracked tool execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPhase {
    /// The pre-state snapshot is being captured.
    CapturingPreState,
    /// The tool itself is running.
    Executing,
    /// The post-state fingerprint is being captured.
    CapturingPostState,
    /// Post and pre states are being compared.
    Comparing,
    /// The pre-state snapshot was kept.
    Committed,
    /// The pre-state snapshot was discarded; nothing really changed.
    Discarded,
}

/// Book-keeping for one in-flight tool execution.
#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub tool_call_id: String,
    pub tool_name: String,
    pub args: Value,
    pub phase: ExecutionPhase,
    /// The pre-state snapshot, once captured.
    pub snapshot_id: Option<SnapshotId>,
    pub started_at: DateTime<Utc>,
}

/// In-flight execution records, at most one per tool-call id.
#[derive(Debug, Default)]
pub struct ExecutionTracker {
    records: Mutex<HashMap<String, ExecutionRecord>>,
}

impl ExecutionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a tool call in [`ExecutionPhase::CapturingPreState`].
    ///
    /// A record already under the same id is stale (its completion never
    /// arrived) and is replaced; the displaced record is returned.
    pub fn begin(&self, tool_call_id: &str, tool_name: &str, args: Value) -> Option<ExecutionRecord> {
        let record = ExecutionRecord {
            tool_call_id: tool_call_id.to_string(),
            tool_name: tool_name.to_string(),
            args,
            phase: ExecutionPhase::CapturingPreState,
            snapshot_id: None,
            started_at: Utc::now(),
        };

        let mut records = self.lock();
        let displaced = records.insert(tool_call_id.to_string(), record);
        if let Some(stale) = &displaced {
            warn!(
                tool_call_id = %tool_call_id,
                stale_tool = %stale.tool_name,
                "Replacing stale execution record"
            );
        }
        displaced
    }

    /// Move a tracked call to a new phase. Returns false for unknown ids.
    pub fn advance(&self, tool_call_id: &str, phase: ExecutionPhase) -> bool {
        let mut records = self.lock();
        match records.get_mut(tool_call_id) {
            Some(record) => {
                record.phase = phase;
                true
            }
            None => false,
        }
    }

    /// Attach the captured pre-state snapshot to a tracked call.
    pub fn attach_snapshot(&self, tool_call_id: &str, snapshot_id: SnapshotId) -> bool {
        let mut records = self.lock();
        match records.get_mut(tool_call_id) {
            Some(record) => {
                record.snapshot_id = Some(snapshot_id);
                true
            }
            None => false,
        }
    }

    /// Snapshot of the record for a tool-call id.
    pub fn get(&self, tool_call_id: &str) -> Option<ExecutionRecord> {
        self.lock().get(tool_call_id).cloned()
    }

    /// Stop tracking a tool call, returning its final record.
    pub fn finish(&self, tool_call_id: &str) -> Option<ExecutionRecord> {
        self.lock().remove(tool_call_id)
    }

    /// Number of in-flight records.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ExecutionRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_begin_advance_finish() {
        let tracker = ExecutionTracker::new();

        assert!(tracker
            .begin("call-1", "write", json!({"filePath": "a.rs"}))
            .is_none());
        assert_eq!(tracker.len(), 1);
        assert_eq!(
            tracker.get("call-1").unwrap().phase,
            ExecutionPhase::CapturingPreState
        );

        assert!(tracker.advance("call-1", ExecutionPhase::Executing));
        assert!(tracker.attach_snapshot("call-1", SnapshotId::from_string("snap_a")));

        let record = tracker.finish("call-1").unwrap();
        assert_eq!(record.phase, ExecutionPhase::Executing);
        assert_eq!(record.snapshot_id, Some(SnapshotId::from_string("snap_a")));
        assert_eq!(record.args["filePath"], "a.rs");
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_duplicate_begin_replaces_stale_record() {
        let tracker = ExecutionTracker::new();

        tracker.begin("call-1", "write", json!({}));
        let stale = tracker.begin("call-1", "edit", json!({})).unwrap();

        assert_eq!(stale.tool_name, "write");
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.get("call-1").unwrap().tool_name, "edit");
    }

    #[test]
    fn test_operations_on_unknown_id() {
        let tracker = ExecutionTracker::new();

        assert!(!tracker.advance("ghost", ExecutionPhase::Comparing));
        assert!(!tracker.attach_snapshot("ghost", SnapshotId::from_string("snap_a")));
        assert!(tracker.get("ghost").is_none());
        assert!(tracker.finish("ghost").is_none());
    }

    #[test]
    fn test_independent_ids_tracked_separately() {
        let tracker = ExecutionTracker::new();

        tracker.begin("call-1", "write", json!({}));
        tracker.begin("call-2", "bash", json!({}));
        assert_eq!(tracker.len(), 2);

        tracker.finish("call-1");
        assert_eq!(tracker.len(), 1);
        assert!(tracker.get("call-2").is_some());
    }
}
