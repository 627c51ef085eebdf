//! Shared model types for the dumpmill dump orchestration engine.
//!
//! Pure data types used across the naming, state, exec, and engine crates.
//! Kept in one crate so they can be shared without circular dependencies.

#![warn(clippy::pedantic)]

pub mod ids;
pub mod manifest;
pub mod range;
pub mod status;

pub use ids::{DumpDate, WikiId};
pub use manifest::{JobRecord, RunManifest};
pub use range::PageRange;
pub use status::{JobStatus, RunStatus};
