use anyhow::{Context, Result};

use dumpmill_engine::DumpConfig;
use dumpmill_state::RunStore;
use dumpmill_types::{DumpDate, JobStatus, WikiId};

/// Execute the `status` command: mark a job's manifest status by hand.
///
/// Typical uses are `skipped` to take a job out of a run and `waiting` to
/// force a retry of something the engine marked `failed`.
pub fn execute(
    config: &DumpConfig,
    wiki: &WikiId,
    job: &str,
    status: JobStatus,
    date: Option<DumpDate>,
) -> Result<()> {
    let date = match date {
        Some(date) => date,
        None => super::latest_date(config, wiki)?,
    };
    let store = RunStore::new(config.date_dir(wiki, &date));
    let mut manifest = store
        .load()?
        .with_context(|| format!("no run manifest for {wiki}/{date}"))?;
    anyhow::ensure!(
        manifest.job(job).is_some(),
        "no job '{job}' in the {wiki}/{date} manifest"
    );
    store.update_job(&mut manifest, job, status, "set by operator")?;
    println!("{job} marked {} for {wiki}/{date}.", status.as_str());
    Ok(())
}
