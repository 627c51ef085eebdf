//! Page-id ranges.

use serde::{Deserialize, Serialize};

/// An inclusive page-id range `[first, last]`.
///
/// Used both as checkpoint metadata on a dump filename and as the unit the
/// prefetch resolver reasons about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageRange {
    pub first: u64,
    pub last: u64,
}

impl PageRange {
    /// Create a range, normalising nothing: callers must pass `first <= last`.
    ///
    /// # Errors
    ///
    /// Returns [`InvertedRange`] when `first > last`.
    pub fn new(first: u64, last: u64) -> Result<Self, InvertedRange> {
        if first <= last {
            Ok(Self { first, last })
        } else {
            Err(InvertedRange { first, last })
        }
    }

    /// Whether two inclusive ranges share at least one page id.
    #[must_use]
    pub fn overlaps(self, other: Self) -> bool {
        self.first <= other.last && other.first <= self.last
    }

    /// Whether `other` is fully contained in `self`.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.first <= other.first && other.last <= self.last
    }
}

impl std::fmt::Display for PageRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}p{}", self.first, self.last)
    }
}

/// Error for a range whose first page id exceeds its last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("inverted page range: first {first} > last {last}")]
pub struct InvertedRange {
    pub first: u64,
    pub last: u64,
}
