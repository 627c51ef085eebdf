//! Canonical dump filename grammar and date-directory catalog.
//!
//! [`DumpFileName`] encodes and decodes the on-disk naming scheme
//! `<wiki>-<date>-<dumpname>[<part>][.<filetype>][-p<first>p<last>].<ext>`
//! with optional `.inprog` / `-tmp` suffixes. [`DumpCatalog`] lists a dump
//! date directory against that scheme with an mtime-guarded cache.

#![warn(clippy::pedantic)]

pub mod catalog;
pub mod error;
pub mod name;
pub mod natural;

pub use catalog::{CatalogEntry, DumpCatalog, FileFilter, PartsFilter, Presence};
pub use error::NamingError;
pub use name::DumpFileName;
pub use natural::natural_cmp;
