//! Dump run engine: configuration, the job state machine, prefetch
//! resolution, and the per-(wiki, date) orchestrator.
//!
//! The engine drives a fixed, ordered list of dump jobs for one wiki and
//! one dump date. Jobs declare prerequisites by name; a job whose
//! prerequisite failed becomes a hard failure without running, while a job
//! whose prerequisite has simply not run yet stays waiting for a later
//! resume. Every status transition is persisted to the run manifest so an
//! interrupted run can pick up where it left off.

#![warn(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod job;
pub mod jobs;
pub mod notify;
pub mod orchestrator;
pub mod prefetch;
pub mod truncation;

pub use config::{load_config, DumpConfig};
pub use error::DumpError;
pub use job::{Job, JobContext, JobSpec};
pub use notify::{LogNotifier, Notifier};
pub use orchestrator::{Orchestrator, RunSummary};
pub use prefetch::PrefetchResolver;
