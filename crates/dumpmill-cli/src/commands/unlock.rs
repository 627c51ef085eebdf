use std::time::Duration;

use anyhow::{Context, Result};

use dumpmill_engine::DumpConfig;
use dumpmill_state::{LockManager, RunStore};
use dumpmill_types::{DumpDate, WikiId};

/// Execute the `unlock` command.
///
/// Without `--force` the lock is removed only if it passes the staleness
/// check (old enough **and** no live tagged process). `--force` skips the
/// check; either path stamps the run `aborted` first so status displays do
/// not show it as still in progress.
pub async fn execute(
    config: &DumpConfig,
    wiki: &WikiId,
    date: Option<DumpDate>,
    force: bool,
) -> Result<()> {
    let date = match date {
        Some(date) => date,
        None => super::latest_date(config, wiki)?,
    };
    let manager = LockManager::new(&config.private_root, config.run_marker_var.clone());
    let path = manager.lock_path(wiki, &date);
    if !path.exists() {
        println!("No lock held for {wiki}/{date}.");
        return Ok(());
    }
    let store = RunStore::new(config.date_dir(wiki, &date));

    if force {
        store.mark_aborted()?;
        std::fs::remove_file(&path)
            .with_context(|| format!("removing {}", path.display()))?;
        println!("Lock removed for {wiki}/{date}.");
        return Ok(());
    }

    let stale_age = Duration::from_secs(config.stale_age_secs);
    if manager.cleanup_stale(wiki, &date, stale_age, &store).await? {
        println!("Stale lock reclaimed for {wiki}/{date}.");
    } else {
        println!(
            "Lock for {wiki}/{date} looks live or too young; pass --force to remove it anyway."
        );
    }
    Ok(())
}
