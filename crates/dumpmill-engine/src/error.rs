//! Engine error taxonomy.
//!
//! Callers branch on the variant, never on message text. The one soft
//! variant is [`DumpError::PrerequisiteNotReady`]: the job cannot run yet
//! but nothing is wrong, so it stays waiting and a later resume retries it.

use std::path::PathBuf;

/// Errors raised while running a dump job.
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    /// Unrecoverable failure; the job is marked failed.
    #[error(transparent)]
    HardFailure(#[from] anyhow::Error),

    /// A prerequisite has not completed yet. The job stays waiting.
    #[error("prerequisite not ready: {job}")]
    PrerequisiteNotReady { job: String },

    /// An output file failed its post-run integrity check and was renamed
    /// aside with a `.truncated` suffix.
    #[error("truncated output detected: {file}")]
    TruncationDetected { file: PathBuf },

    /// The (wiki, date) lock is held by another run.
    #[error("dump run already locked: {path}")]
    LockContention { path: PathBuf },

    /// An external command exited non-zero.
    #[error("command failed: `{argv}` (exit {code:?})")]
    CommandFailed { argv: String, code: Option<i32> },
}

impl DumpError {
    /// Whether the error leaves the job waiting instead of failed.
    #[must_use]
    pub fn is_soft(&self) -> bool {
        matches!(self, Self::PrerequisiteNotReady { .. })
    }
}

impl From<dumpmill_exec::ExecError> for DumpError {
    fn from(err: dumpmill_exec::ExecError) -> Self {
        Self::HardFailure(err.into())
    }
}

impl From<dumpmill_state::StateError> for DumpError {
    fn from(err: dumpmill_state::StateError) -> Self {
        Self::HardFailure(err.into())
    }
}

impl From<std::io::Error> for DumpError {
    fn from(err: std::io::Error) -> Self {
        Self::HardFailure(err.into())
    }
}
