//! Snapshot error types.

use thiserror::Error;

/// Result type for snapshot operations.
pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Errors that can occur during snapshot operations.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Snapshot not found.
    #[error("Snapshot not found: {0}")]
    NotFound(String),

    /// Invalid caller input (blank description, malformed id, ...).
    #[error("Validation error: {0}")]
    Validation(String),

    /// The capture base directory could not be read.
    #[error("Capture failed: {0}")]
    Capture(String),

    /// Restore could not start or finish.
    #[error("Restore failed: {0}")]
    Restore(String),

    /// A differential chain is missing an ancestor or its content.
    #[error("Broken snapshot chain: {0}")]
    BrokenChain(String),

    /// Stored content failed integrity verification.
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Store backend error.
    #[error("Store error: {0}")]
    Store(String),

    /// Lock was poisoned (another thread panicked while holding the lock).
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SnapshotError {
    /// Create a not found error.
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound(id.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a capture error.
    pub fn capture(message: impl Into<String>) -> Self {
        Self::Capture(message.into())
    }

    /// Create a restore error.
    pub fn restore(message: impl Into<String>) -> Self {
        Self::Restore(message.into())
    }

    /// Create a broken chain error.
    pub fn broken_chain(message: impl Into<String>) -> Self {
        Self::BrokenChain(message.into())
    }

    /// Create a store error.
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }
}
