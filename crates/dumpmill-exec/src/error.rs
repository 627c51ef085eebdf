//! Exec error types.
//!
//! A stage exiting non-zero is not an [`ExecError`]: command failures are
//! data, reported per pipeline in the outcome with the offending argv.
//! `ExecError` covers the host-side problems that prevent running at all.

/// Errors produced while wiring up or supervising a pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    /// A stage failed to spawn.
    #[error("failed to spawn `{argv}`: {source}")]
    Spawn {
        argv: String,
        source: std::io::Error,
    },

    /// Plumbing between stages or output capture failed.
    #[error("i/o failure while running `{argv}`: {source}")]
    Io {
        argv: String,
        source: std::io::Error,
    },

    /// A pipeline with no stages was submitted.
    #[error("empty pipeline")]
    EmptyPipeline,

    /// A capture command exited non-zero.
    #[error("`{argv}` exited with {code:?}: {stderr}")]
    CaptureFailed {
        argv: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ExecError>;
