use anyhow::{bail, Context, Result};

use dumpmill_engine::job::DumpJob;
use dumpmill_engine::jobs::{rerun_job, standard_jobs};
use dumpmill_engine::{DumpConfig, JobContext, Orchestrator, PrefetchResolver};
use dumpmill_exec::PipelineRunner;
use dumpmill_files::DumpCatalog;
use dumpmill_types::{DumpDate, PageRange, WikiId};

/// Execute the `job` command: re-run one job, optionally narrowed to a
/// single part or checkpoint range.
pub async fn execute(
    config: &DumpConfig,
    wiki: WikiId,
    job_name: &str,
    date: Option<DumpDate>,
    part: Option<u32>,
    checkpoint: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let date = match date {
        Some(date) => date,
        None => super::latest_date(config, &wiki)?,
    };
    let checkpoint = checkpoint.as_deref().map(parse_checkpoint).transpose()?;

    let Some(job) = rerun_job(config, job_name, part, checkpoint) else {
        bail!(
            "unknown job '{job_name}' (or it cannot be narrowed to that slice); \
             known jobs: {}",
            known_jobs(config)
        );
    };

    println!("{}: {}", job.name(), job.detail());
    {
        let catalog = DumpCatalog::new(&config.public_root, wiki.clone());
        let runner = PipelineRunner::new();
        let prefetch = PrefetchResolver::new(config, &catalog, &runner);
        let ctx = JobContext {
            config,
            wiki: &wiki,
            date: &date,
            catalog: &catalog,
            runner: &runner,
            prefetch: &prefetch,
            dry_run,
        };
        for name in job.list_outfiles(&ctx)? {
            println!("  will produce {}", name.file_name());
        }
    }

    let summary = Orchestrator::new(config, wiki.clone(), date.clone())
        .with_dry_run(dry_run)
        .run_jobs(vec![job])
        .await?;

    super::run::print_summary(&wiki, &date, &summary);
    if summary.failed > 0 {
        bail!("job '{job_name}' failed");
    }
    if summary.waiting > 0 {
        println!("Prerequisites not ready; nothing was run.");
    }
    Ok(())
}

/// Parse a checkpoint range in the on-disk form, e.g. `p100p200`.
fn parse_checkpoint(s: &str) -> Result<PageRange> {
    let parse = || -> Option<Result<PageRange>> {
        let rest = s.strip_prefix('p')?;
        let (first, last) = rest.split_once('p')?;
        let first: u64 = first.parse().ok()?;
        let last: u64 = last.parse().ok()?;
        Some(PageRange::new(first, last).map_err(Into::into))
    };
    parse().with_context(|| format!("checkpoint must look like p<first>p<last>, got '{s}'"))?
}

fn known_jobs(config: &DumpConfig) -> String {
    standard_jobs(config)
        .iter()
        .map(|j| j.name())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_parses_the_on_disk_form() {
        let range = parse_checkpoint("p100p200").unwrap();
        assert_eq!(range.first, 100);
        assert_eq!(range.last, 200);
    }

    #[test]
    fn test_bad_checkpoints_are_rejected() {
        assert!(parse_checkpoint("100-200").is_err());
        assert!(parse_checkpoint("p100").is_err());
        assert!(parse_checkpoint("p200p100").is_err());
    }
}
