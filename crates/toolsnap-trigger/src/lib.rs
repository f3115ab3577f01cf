//! Automatic snapshot triggering for tool-driven editing sessions.
//!
//! Wires a [`toolsnap_core::SnapshotManager`] into a tool-execution
//! loop:
//!
//! - [`classify`] decides which tools modify files and which target
//!   paths their arguments name
//! - [`tracker`] follows each tool call through its capture lifecycle
//! - [`integration`] takes pre-execution snapshots, discards them when
//!   nothing changed, and handles the one-time initial project snapshot
//!
//! ```no_run
//! use serde_json::json;
//! use toolsnap_core::{SnapshotConfig, SnapshotManager};
//! use toolsnap_trigger::{SnapshotIntegration, ToolCall, ToolOutcome, TriggerContext};
//!
//! # async fn example() {
//! let manager = SnapshotManager::new("/project/root", SnapshotConfig::default());
//! let integration = SnapshotIntegration::new(manager);
//! let ctx = TriggerContext::new("session-1", "/project/root");
//!
//! integration.on_application_start(&ctx).await;
//!
//! let call = ToolCall::new("call-1", "write", json!({"filePath": "src/main.rs"}));
//! integration.on_tool_execution(&call, &ctx).await;
//! // ... the tool runs ...
//! integration
//!     .on_execution_complete(&call.id, &ToolOutcome { success: true })
//!     .await;
//! # }
//! ```

pub mod classify;
pub mod integration;
pub mod tracker;

pub use classify::{ToolCatalog, ToolProfile};
pub use integration::{SnapshotIntegration, ToolCall, ToolOutcome, TriggerContext};
pub use tracker::{ExecutionPhase, ExecutionRecord, ExecutionTracker};
