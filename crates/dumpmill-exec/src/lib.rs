//! OS pipeline execution for dump jobs.
//!
//! A [`CommandPipeline`] is an ordered list of argv vectors connected
//! stdout-to-stdin exactly as a shell pipeline would be; a
//! [`CommandSeries`] is a sequential list of pipelines; a parallel batch is
//! a list of independent series run concurrently up to a worker-count
//! bound. All of these are ephemeral, created per job invocation and
//! discarded once the exit status and captured output are extracted.

#![warn(clippy::pedantic)]

pub mod error;
pub mod pipeline;
pub mod runner;

pub use error::ExecError;
pub use pipeline::{Command, CommandPipeline, CommandSeries};
pub use runner::{
    LineCallback, ParallelOutcome, PipelineRunner, ProgressCallback, SeriesOutcome, StageFailure,
    DEFAULT_PROGRESS_PERIOD,
};
