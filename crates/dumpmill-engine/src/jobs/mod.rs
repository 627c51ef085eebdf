//! The concrete dump jobs, in their fixed run order.

pub mod articles;
pub mod meta_history;
pub mod recompress;
pub mod stubs;
pub mod tables;

pub use articles::ArticlesJob;
pub use meta_history::MetaHistoryJob;
pub use recompress::RecompressJob;
pub use stubs::StubsJob;
pub use tables::TablesJob;

use dumpmill_types::PageRange;

use crate::config::DumpConfig;
use crate::job::DumpJob;

/// The standard ordered job list for one wiki run. Order matters only for
/// operator-facing output; correctness comes from the prerequisite checks.
#[must_use]
pub fn standard_jobs(config: &DumpConfig) -> Vec<Box<dyn DumpJob>> {
    vec![
        Box::new(TablesJob::new()),
        Box::new(StubsJob::new(config)),
        Box::new(ArticlesJob::new(config)),
        Box::new(MetaHistoryJob::new(config)),
        Box::new(RecompressJob::new()),
    ]
}

/// Look up a standard job by name, for single-job reruns.
#[must_use]
pub fn job_by_name(config: &DumpConfig, name: &str) -> Option<Box<dyn DumpJob>> {
    standard_jobs(config).into_iter().find(|j| j.name() == name)
}

/// Build a job narrowed to one part or one checkpoint range, for operator
/// reruns of a slice. Jobs that do not chunk ignore the narrowing.
#[must_use]
pub fn rerun_job(
    config: &DumpConfig,
    name: &str,
    part: Option<u32>,
    checkpoint: Option<PageRange>,
) -> Option<Box<dyn DumpJob>> {
    match (name, part, checkpoint) {
        ("metahistorybz2dump", part, Some(range)) => {
            Some(Box::new(MetaHistoryJob::for_checkpoint(config, part, range)))
        }
        ("metahistorybz2dump", Some(p), None) => {
            Some(Box::new(MetaHistoryJob::for_part(config, p)))
        }
        ("articlesdump", Some(p), None) => Some(Box::new(ArticlesJob::for_part(config, p))),
        ("xmlstubsdump", Some(p), None) => Some(Box::new(StubsJob::for_part(config, p))),
        (name, None, None) => job_by_name(config, name),
        _ => None,
    }
}
