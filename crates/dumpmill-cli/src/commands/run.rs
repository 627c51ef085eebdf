use anyhow::Result;

use dumpmill_engine::{DumpConfig, Orchestrator, RunSummary};
use dumpmill_types::{DumpDate, WikiId};

/// Execute the `run` command: the full job list for one wiki and date.
pub async fn execute(
    config: &DumpConfig,
    wiki: WikiId,
    date: Option<DumpDate>,
    dry_run: bool,
) -> Result<()> {
    let date = match date {
        Some(date) => date,
        None => super::today()?,
    };
    tracing::info!(wiki = %wiki, date = %date, dry_run, "starting run");

    let summary = Orchestrator::new(config, wiki.clone(), date.clone())
        .with_dry_run(dry_run)
        .run()
        .await?;

    print_summary(&wiki, &date, &summary);
    if summary.failed > 0 {
        anyhow::bail!("{} job(s) failed", summary.failed);
    }
    Ok(())
}

pub fn print_summary(wiki: &WikiId, date: &DumpDate, summary: &RunSummary) {
    println!("Run for {wiki}/{date} finished.");
    println!("  Done:    {}", summary.done);
    println!("  Failed:  {}", summary.failed);
    println!("  Waiting: {}", summary.waiting);
    if summary.skipped > 0 {
        println!("  Skipped: {}", summary.skipped);
    }
    if summary.aborted_early {
        println!("  Stopped early: maintenance or exit marker present.");
    }
}
