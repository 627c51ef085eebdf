//! Typed configuration model.
//!
//! One `DumpConfig` is loaded at startup and passed by reference to every
//! component constructor. Nothing reads configuration from globals.

use std::path::PathBuf;

use dumpmill_types::{DumpDate, PageRange, WikiId};
use serde::Deserialize;

/// Paths of the external tools the jobs shell out to. Every one is
/// configurable so tests can substitute stand-ins.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Binaries {
    #[serde(default = "default_php")]
    pub php: String,
    #[serde(default = "default_mysqldump")]
    pub mysqldump: String,
    #[serde(default = "default_gzip")]
    pub gzip: String,
    #[serde(default = "default_bzip2")]
    pub bzip2: String,
    #[serde(default = "default_sevenzip")]
    pub sevenzip: String,
    #[serde(default = "default_head")]
    pub head: String,
}

fn default_php() -> String {
    "/usr/bin/php".to_string()
}
fn default_mysqldump() -> String {
    "/usr/bin/mysqldump".to_string()
}
fn default_gzip() -> String {
    "/usr/bin/gzip".to_string()
}
fn default_bzip2() -> String {
    "/usr/bin/bzip2".to_string()
}
fn default_sevenzip() -> String {
    "/usr/bin/7za".to_string()
}
fn default_head() -> String {
    "/usr/bin/head".to_string()
}

impl Default for Binaries {
    fn default() -> Self {
        Self {
            php: default_php(),
            mysqldump: default_mysqldump(),
            gzip: default_gzip(),
            bzip2: default_bzip2(),
            sevenzip: default_sevenzip(),
            head: default_head(),
        }
    }
}

/// Database access for the SQL table exports. The credentials file is an
/// opaque handle passed straight to `mysqldump --defaults-extra-file`; the
/// engine never parses it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
    /// SQL tables exported by the tables job.
    #[serde(default = "default_tables")]
    pub tables: Vec<String>,
}

fn default_tables() -> Vec<String> {
    [
        "site_stats",
        "page_props",
        "page_restrictions",
        "protected_titles",
        "category",
        "user_groups",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

/// Page-id chunking layout for the big XML jobs.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PartsConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Pages per part, in order. The final part is open-ended.
    #[serde(default)]
    pub page_bands: Vec<u64>,
}

impl PartsConfig {
    /// The 1-based parts with their page-id ranges. The last part has no
    /// upper bound.
    #[must_use]
    pub fn part_ranges(&self) -> Vec<(u32, u64, Option<u64>)> {
        let mut ranges = Vec::with_capacity(self.page_bands.len());
        let mut start = 1u64;
        let last = self.page_bands.len().saturating_sub(1);
        for (i, band) in self.page_bands.iter().enumerate() {
            let part = u32::try_from(i).unwrap_or(u32::MAX).saturating_add(1);
            if i == last {
                ranges.push((part, start, None));
            } else {
                let end = start.saturating_add(*band).saturating_sub(1);
                ranges.push((part, start, Some(end)));
                start = end + 1;
            }
        }
        ranges
    }

    /// The page range of one part, open ends closed at `u64::MAX`.
    #[must_use]
    pub fn range_of(&self, part: u32) -> Option<PageRange> {
        self.part_ranges()
            .into_iter()
            .find(|(p, _, _)| *p == part)
            .and_then(|(_, first, last)| PageRange::new(first, last.unwrap_or(u64::MAX)).ok())
    }
}

/// Complete run configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DumpConfig {
    /// Root of the published dump tree (`<public>/<wiki>/<date>/...`).
    pub public_root: PathBuf,
    /// Root of the non-published tree: locks and marker files.
    pub private_root: PathBuf,

    /// MediaWiki checkout whose maintenance scripts produce the XML dumps.
    #[serde(default = "default_mediawiki_root")]
    pub mediawiki_root: PathBuf,

    #[serde(default)]
    pub binaries: Binaries,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub parts: PartsConfig,

    /// Write page-range checkpoint files during the history job.
    #[serde(default)]
    pub checkpoints: bool,

    #[serde(default = "default_worker_count")]
    pub worker_count: usize,

    /// Lock files older than this are candidates for reclaim.
    #[serde(default = "default_stale_age_secs")]
    pub stale_age_secs: u64,

    /// Prior-run files smaller than this are never used as a prefetch
    /// source; a file that small is a truncated run, not a small wiki.
    #[serde(default = "default_prefetch_min_bytes")]
    pub prefetch_min_bytes: u64,

    #[serde(default = "default_maintenance_file")]
    pub maintenance_file: String,
    #[serde(default = "default_exit_file")]
    pub exit_file: String,

    /// Environment variable stamped on every spawned process so the
    /// staleness probe can recognize our workers in the process table.
    #[serde(default = "default_run_marker_var")]
    pub run_marker_var: String,

    #[serde(default)]
    pub notify_admin: bool,
}

fn default_mediawiki_root() -> PathBuf {
    PathBuf::from("/srv/mediawiki")
}
fn default_worker_count() -> usize {
    1
}
fn default_stale_age_secs() -> u64 {
    3600
}
fn default_prefetch_min_bytes() -> u64 {
    70_000
}
fn default_maintenance_file() -> String {
    "maintenance.txt".to_string()
}
fn default_exit_file() -> String {
    "exit.txt".to_string()
}
fn default_run_marker_var() -> String {
    "DUMPMILL_RUN".to_string()
}

impl DumpConfig {
    /// A config over explicit roots with every other field defaulted.
    /// Test and embedding convenience.
    #[must_use]
    pub fn with_roots(public_root: impl Into<PathBuf>, private_root: impl Into<PathBuf>) -> Self {
        Self {
            public_root: public_root.into(),
            private_root: private_root.into(),
            mediawiki_root: default_mediawiki_root(),
            binaries: Binaries::default(),
            database: DatabaseConfig::default(),
            parts: PartsConfig::default(),
            checkpoints: false,
            worker_count: default_worker_count(),
            stale_age_secs: default_stale_age_secs(),
            prefetch_min_bytes: default_prefetch_min_bytes(),
            maintenance_file: default_maintenance_file(),
            exit_file: default_exit_file(),
            run_marker_var: default_run_marker_var(),
            notify_admin: false,
        }
    }

    /// Published directory of one wiki.
    #[must_use]
    pub fn wiki_dir(&self, wiki: &WikiId) -> PathBuf {
        self.public_root.join(wiki.as_str())
    }

    /// Published directory of one (wiki, date) run.
    #[must_use]
    pub fn date_dir(&self, wiki: &WikiId, date: &DumpDate) -> PathBuf {
        self.wiki_dir(wiki).join(date.as_str())
    }

    /// `latest/` symlink directory of one wiki.
    #[must_use]
    pub fn latest_dir(&self, wiki: &WikiId) -> PathBuf {
        self.wiki_dir(wiki).join("latest")
    }

    /// Marker file that pauses new work between jobs.
    #[must_use]
    pub fn maintenance_path(&self) -> PathBuf {
        self.private_root.join(&self.maintenance_file)
    }

    /// Marker file that stops the run entirely between jobs.
    #[must_use]
    pub fn exit_path(&self) -> PathBuf {
        self.private_root.join(&self.exit_file)
    }

    /// Path of a MediaWiki maintenance script.
    #[must_use]
    pub fn maintenance_script(&self, name: &str) -> PathBuf {
        self.mediawiki_root.join("maintenance").join(name)
    }

    /// Database name for a wiki; by convention the wiki id.
    #[must_use]
    pub fn db_name<'a>(&self, wiki: &'a WikiId) -> &'a str {
        wiki.as_str()
    }

    /// Decompressor argv prefix for a compressed extension, used both by
    /// prefetch range scanning and the gz/7z integrity checks.
    #[must_use]
    pub fn decompressor(&self, ext: &str) -> Option<(&str, Vec<&'static str>)> {
        match ext {
            "gz" => Some((self.binaries.gzip.as_str(), vec!["-dc"])),
            "bz2" => Some((self.binaries.bzip2.as_str(), vec!["-dc"])),
            "7z" => Some((self.binaries.sevenzip.as_str(), vec!["e", "-so"])),
            _ => None,
        }
    }
}
