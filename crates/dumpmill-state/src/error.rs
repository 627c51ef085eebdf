//! State and lock error types.

use std::path::PathBuf;

/// Errors produced by [`RunStore`](crate::RunStore) operations.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// File-system I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The manifest file is not valid JSON for the expected model.
    #[error("malformed run manifest: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors produced by [`LockManager`](crate::LockManager) operations.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// The lock file already exists: another run owns this (wiki, date).
    #[error("already locked: {path}")]
    AlreadyLocked { path: PathBuf },

    /// The lock file does not hold `"<hostname> <pid>"`.
    #[error("malformed lock file {path}: {content:?}")]
    Malformed { path: PathBuf, content: String },

    /// File-system I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing the aborted marker during stale-lock cleanup failed.
    #[error("failed to record aborted run: {0}")]
    State(#[from] StateError),
}
