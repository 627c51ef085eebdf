//! Wiki and dump-date identifiers.

use serde::{Deserialize, Serialize};

/// Opaque wiki database name (e.g. `"enwiki"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WikiId(String);

impl WikiId {
    /// Create a new wiki identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WikiId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Into<String>> From<S> for WikiId {
    fn from(value: S) -> Self {
        Self(value.into())
    }
}

/// A dump run date in canonical `YYYYMMDD` form.
///
/// Only the shape is validated (eight ASCII digits); calendar validity is
/// left to whoever mints the date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DumpDate(String);

impl DumpDate {
    /// Parse a `YYYYMMDD` date string.
    ///
    /// # Errors
    ///
    /// Returns [`BadDate`] when the input is not eight ASCII digits.
    pub fn parse(s: &str) -> Result<Self, BadDate> {
        if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(BadDate(s.to_string()))
        }
    }

    /// Borrow the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DumpDate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DumpDate {
    type Err = BadDate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Error returned for a string that is not a `YYYYMMDD` date.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a YYYYMMDD dump date: {0:?}")]
pub struct BadDate(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wiki_id_display_and_as_str() {
        let w = WikiId::new("enwiki");
        assert_eq!(w.as_str(), "enwiki");
        assert_eq!(w.to_string(), "enwiki");
    }

    #[test]
    fn test_dump_date_accepts_eight_digits() {
        let d = DumpDate::parse("20240101").unwrap();
        assert_eq!(d.as_str(), "20240101");
    }

    #[test]
    fn test_dump_date_rejects_malformed() {
        assert!(DumpDate::parse("2024-01-01").is_err());
        assert!(DumpDate::parse("202401").is_err());
        assert!(DumpDate::parse("2024010a").is_err());
    }

    #[test]
    fn test_dump_date_orders_lexically() {
        let old = DumpDate::parse("20231201").unwrap();
        let new = DumpDate::parse("20240101").unwrap();
        assert!(old < new);
    }
}
