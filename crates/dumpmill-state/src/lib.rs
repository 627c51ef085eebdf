//! Run state persistence and locking for dumpmill.
//!
//! [`RunStore`] persists the per-job run manifest as a JSON file inside the
//! date directory so a later invocation (possibly on another host) can
//! resume a partial run. [`LockManager`] provides exclusive advisory locks
//! per (wiki, date) with hostname/pid metadata, a heartbeat task, and a
//! process-table-verified staleness check.

#![warn(clippy::pedantic)]

pub mod error;
pub mod lock;
pub mod store;

pub use error::{LockError, StateError};
pub use lock::{DumpLock, LockManager, LockOwner};
pub use store::RunStore;
