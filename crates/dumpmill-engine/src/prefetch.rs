//! Historical-file prefetch resolution.
//!
//! The big XML passes can reuse page text from an earlier dump run instead
//! of re-fetching it from the database, but only from a prior run that is
//! recorded complete, covers the needed page-id range, and is not the run
//! currently being written. Resolution is best-effort by contract: any
//! failure along the way yields `None` and the caller falls back to full
//! retrieval.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use dumpmill_exec::{Command, CommandPipeline, CommandSeries, PipelineRunner};
use dumpmill_files::{DumpCatalog, DumpFileName, FileFilter, PartsFilter, Presence};
use dumpmill_state::RunStore;
use dumpmill_types::{DumpDate, PageRange};
use tracing::debug;

use crate::config::DumpConfig;

/// How many decompressed lines to scan for the first page id.
const SCAN_LINES: u32 = 500;

/// Finds a prior run's files covering a page range.
pub struct PrefetchResolver<'a> {
    config: &'a DumpConfig,
    catalog: &'a DumpCatalog,
    runner: &'a PipelineRunner,
    /// First page id per scanned file, cached for the run. Scanning spawns
    /// a decompressor, so repeats are worth avoiding.
    first_page_cache: Mutex<HashMap<PathBuf, Option<u64>>>,
}

impl<'a> PrefetchResolver<'a> {
    #[must_use]
    pub fn new(
        config: &'a DumpConfig,
        catalog: &'a DumpCatalog,
        runner: &'a PipelineRunner,
    ) -> Self {
        Self {
            config,
            catalog,
            runner,
            first_page_cache: Mutex::new(HashMap::new()),
        }
    }

    /// The most recent prior run's files overlapping `needed`, or `None`
    /// when no prior run qualifies. Within a qualifying date, checkpoint
    /// files are preferred over part files over the whole-job file.
    pub async fn find_source(
        &self,
        job_name: &str,
        dumpname: &str,
        filetype: Option<&str>,
        ext: &str,
        needed: PageRange,
        current_date: &DumpDate,
    ) -> Option<Vec<PathBuf>> {
        let current_dir = real_path(&self.catalog.date_dir(current_date));
        let mut dates = self.catalog.dates().ok()?;
        dates.sort();

        for date in dates.iter().rev() {
            let dir = self.catalog.date_dir(date);
            // Symlink-safe self-reference check: `latest`-style aliases of
            // the current run must not feed the run itself.
            if real_path(&dir) == current_dir {
                continue;
            }
            let Ok(Some(manifest)) = RunStore::new(&dir).load() else {
                continue;
            };
            if !manifest.job_done(job_name) {
                debug!(date = %date, job = job_name, "prior run incomplete, skipping");
                continue;
            }
            if let Some(paths) = self
                .source_within_date(date, &dir, dumpname, filetype, ext, needed)
                .await
            {
                debug!(date = %date, count = paths.len(), "prefetch source resolved");
                return Some(paths);
            }
        }
        None
    }

    async fn source_within_date(
        &self,
        date: &DumpDate,
        dir: &Path,
        dumpname: &str,
        filetype: Option<&str>,
        ext: &str,
        needed: PageRange,
    ) -> Option<Vec<PathBuf>> {
        let base = FileFilter {
            dumpname: Some(dumpname.to_string()),
            filetype: filetype.map(str::to_string),
            ext: Some(ext.to_string()),
            temp: Presence::Absent,
            // A half-written file from an interrupted pass is never a
            // usable source, even when the manifest says the job finished.
            inprog: Presence::Absent,
            ..FileFilter::default()
        };

        // Tier 1: checkpoint files carry their range in the name.
        let checkpoints = self
            .catalog
            .filter(
                date,
                &FileFilter {
                    checkpoint: Presence::Present,
                    ..base.clone()
                },
            )
            .ok()?;
        if !checkpoints.is_empty() {
            let hits: Vec<PathBuf> = checkpoints
                .iter()
                .filter(|f| f.checkpoint.is_some_and(|r| r.overlaps(needed)))
                .map(|f| dir.join(f.file_name()))
                .collect();
            return non_empty(hits);
        }

        // Tier 2: part files; ranges recovered by scanning first page ids.
        let parts = self
            .catalog
            .filter(
                date,
                &FileFilter {
                    parts: PartsFilter::Present,
                    checkpoint: Presence::Absent,
                    ..base.clone()
                },
            )
            .ok()?;
        if !parts.is_empty() {
            return non_empty(self.overlapping_parts(dir, &parts, ext, needed).await);
        }

        // Tier 3: the whole-job file covers everything from page 1, if it
        // is big enough to be a real dump at all.
        let whole = self
            .catalog
            .filter(
                date,
                &FileFilter {
                    parts: PartsFilter::Absent,
                    checkpoint: Presence::Absent,
                    ..base
                },
            )
            .ok()?;
        let file = whole.first()?;
        let path = dir.join(file.file_name());
        let size = std::fs::metadata(&path).ok()?.len();
        if size < self.config.prefetch_min_bytes {
            debug!(file = %path.display(), size, "whole-file candidate too small, skipping");
            return None;
        }
        Some(vec![path])
    }

    /// Select the part files whose derived ranges overlap `needed`. A
    /// part's range runs from its first page id to just before the next
    /// part's first page id; the last part is open-ended.
    async fn overlapping_parts(
        &self,
        dir: &Path,
        parts: &[DumpFileName],
        ext: &str,
        needed: PageRange,
    ) -> Vec<PathBuf> {
        let mut firsts = Vec::with_capacity(parts.len());
        for file in parts {
            let path = dir.join(file.file_name());
            firsts.push(self.first_page_id(&path, ext).await);
        }

        let mut hits = Vec::new();
        for (i, file) in parts.iter().enumerate() {
            let Some(first) = firsts[i] else { continue };
            let last = firsts[i + 1..]
                .iter()
                .find_map(|f| *f)
                .map_or(u64::MAX, |next| next.saturating_sub(1));
            let Ok(range) = PageRange::new(first, last.max(first)) else {
                continue;
            };
            if range.overlaps(needed) {
                hits.push(dir.join(file.file_name()));
            }
        }
        hits
    }

    /// First page id in a compressed XML file, from the first `<id>` after
    /// the first `<page>` within the leading decompressed lines.
    async fn first_page_id(&self, path: &Path, ext: &str) -> Option<u64> {
        if let Some(cached) = self
            .first_page_cache
            .lock()
            .ok()?
            .get(path)
            .copied()
        {
            return cached;
        }

        let found = self.scan_first_page_id(path, ext).await;
        if let Ok(mut cache) = self.first_page_cache.lock() {
            cache.insert(path.to_path_buf(), found);
        }
        if found.is_none() {
            debug!(file = %path.display(), "no page id found in file head");
        }
        found
    }

    async fn scan_first_page_id(&self, path: &Path, ext: &str) -> Option<u64> {
        let (program, args) = self.config.decompressor(ext)?;
        let mut argv: Vec<String> = args.iter().map(|s| (*s).to_string()).collect();
        argv.push(path.display().to_string());

        let pipeline = CommandPipeline::new(vec![
            Command::new(program, argv),
            Command::new(&self.config.binaries.head, ["-n", &SCAN_LINES.to_string()]),
        ]);
        let outcome = self
            .runner
            .run_series(&CommandSeries::of(pipeline), None)
            .await
            .ok()?;
        if !outcome.success {
            return None;
        }
        parse_first_page_id(&outcome.output)
    }
}

fn non_empty(paths: Vec<PathBuf>) -> Option<Vec<PathBuf>> {
    if paths.is_empty() {
        None
    } else {
        Some(paths)
    }
}

fn real_path(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// The first `<id>...</id>` after the first `<page>` tag.
fn parse_first_page_id(head: &str) -> Option<u64> {
    let mut in_page = false;
    for line in head.lines() {
        let line = line.trim();
        if !in_page {
            in_page = line.starts_with("<page");
            continue;
        }
        if let Some(rest) = line.strip_prefix("<id>") {
            if let Some(id) = rest.strip_suffix("</id>") {
                return id.parse().ok();
            }
        }
    }
    None
}
