pub mod job;
pub mod maintenance;
pub mod run;
pub mod status;
pub mod unlock;

use anyhow::{Context, Result};
use dumpmill_engine::DumpConfig;
use dumpmill_files::DumpCatalog;
use dumpmill_types::{DumpDate, WikiId};

/// Today's UTC date in dump-directory form.
pub fn today() -> Result<DumpDate> {
    let stamp = chrono::Utc::now().format("%Y%m%d").to_string();
    DumpDate::parse(&stamp).context("formatting today's date")
}

/// The newest dump date on disk for this wiki.
pub fn latest_date(config: &DumpConfig, wiki: &WikiId) -> Result<DumpDate> {
    let catalog = DumpCatalog::new(&config.public_root, wiki.clone());
    let dates = catalog
        .dates()
        .with_context(|| format!("listing dump dates for {wiki}"))?;
    dates
        .into_iter()
        .next_back()
        .with_context(|| format!("no dump runs on disk for {wiki}"))
}
