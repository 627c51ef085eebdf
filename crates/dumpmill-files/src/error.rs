//! Naming error types.

use dumpmill_types::range::InvertedRange;

/// Errors produced when parsing or constructing a [`DumpFileName`](crate::DumpFileName).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NamingError {
    /// The filename does not follow the canonical scheme.
    #[error("not a canonical dump filename: {0:?}")]
    NotCanonical(String),

    /// A checkpoint segment carried an inverted page range.
    #[error(transparent)]
    InvertedRange(#[from] InvertedRange),

    /// A part number was zero; parts are 1-based.
    #[error("part numbers are 1-based, got 0 in {0:?}")]
    ZeroPart(String),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, NamingError>;
