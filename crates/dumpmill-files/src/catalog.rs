//! Date-directory catalog: lists and filters dump output files against the
//! canonical naming scheme, with an mtime-guarded per-date cache.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use dumpmill_types::{DumpDate, WikiId};

use crate::name::DumpFileName;
use crate::natural::natural_cmp;

/// Marker suffixes left behind by truncation detection. Excluded from
/// filter results unless explicitly requested.
pub const MARKER_SUFFIXES: [&str; 2] = [".truncated", ".empty"];

/// One file found in a date directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Parsed canonical name (marker suffix stripped before parsing).
    pub name: DumpFileName,
    /// Raw on-disk file name, marker suffix included.
    pub file_name: String,
    /// Quarantine marker (`.truncated` / `.empty`), if any.
    pub marker: Option<String>,
}

/// Tri-state presence requirement for a boolean file attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    /// Do not constrain.
    #[default]
    Any,
    /// Require the attribute present.
    Present,
    /// Require the attribute absent.
    Absent,
}

impl Presence {
    fn admits(self, present: bool) -> bool {
        match self {
            Self::Any => true,
            Self::Present => present,
            Self::Absent => !present,
        }
    }
}

/// Part-number requirement: like [`Presence`], plus an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PartsFilter {
    /// Do not constrain.
    #[default]
    Any,
    /// Require a part number.
    Present,
    /// Require no part number.
    Absent,
    /// Require one of these part numbers.
    In(Vec<u32>),
}

impl PartsFilter {
    fn admits(&self, part: Option<u32>) -> bool {
        match self {
            Self::Any => true,
            Self::Present => part.is_some(),
            Self::Absent => part.is_none(),
            Self::In(list) => part.is_some_and(|p| list.contains(&p)),
        }
    }
}

/// Filter over one date directory's files.
#[derive(Debug, Clone, Default)]
pub struct FileFilter {
    pub dumpname: Option<String>,
    pub filetype: Option<String>,
    pub ext: Option<String>,
    pub parts: PartsFilter,
    pub temp: Presence,
    pub inprog: Presence,
    pub checkpoint: Presence,
    /// Keep only files carrying one of these marker suffixes.
    pub required_suffixes: Vec<String>,
    /// Marker suffixes to drop; `None` means the default quarantine set.
    pub skip_suffixes: Option<Vec<String>>,
}

impl FileFilter {
    /// Filter for a specific dumpname.
    #[must_use]
    pub fn for_dumpname(dumpname: impl Into<String>) -> Self {
        Self {
            dumpname: Some(dumpname.into()),
            ..Self::default()
        }
    }

    fn admits(&self, entry: &CatalogEntry) -> bool {
        if self.required_suffixes.is_empty() {
            if let Some(m) = &entry.marker {
                // Quarantined files are excluded by default; an explicit
                // skip list narrows the exclusion instead.
                match &self.skip_suffixes {
                    None => return false,
                    Some(skips) if skips.iter().any(|s| s == m) => return false,
                    Some(_) => {}
                }
            }
        } else {
            let wanted = entry
                .marker
                .as_ref()
                .is_some_and(|m| self.required_suffixes.iter().any(|s| s == m));
            if !wanted {
                return false;
            }
        }

        let name = &entry.name;
        if let Some(d) = &self.dumpname {
            if &name.dumpname != d {
                return false;
            }
        }
        if let Some(ft) = &self.filetype {
            if name.filetype.as_deref() != Some(ft.as_str()) {
                return false;
            }
        }
        if let Some(ext) = &self.ext {
            if &name.ext != ext {
                return false;
            }
        }
        self.parts.admits(name.part)
            && self.temp.admits(name.temp)
            && self.inprog.admits(name.inprog)
            && self.checkpoint.admits(name.checkpoint.is_some())
    }
}

struct CacheSlot {
    dir_mtime: SystemTime,
    built_at: SystemTime,
    entries: Vec<CatalogEntry>,
}

impl CacheSlot {
    /// A cached listing is reusable only if the directory mtime is unchanged
    /// and the snapshot was built strictly after the mtime's wall-clock
    /// second. Filesystem mtimes commonly have 1-second resolution, so a
    /// snapshot built within the same second could miss a just-added file.
    fn is_fresh(&self, dir_mtime: SystemTime) -> bool {
        if self.dir_mtime != dir_mtime {
            return false;
        }
        let (Some(built), Some(mtime)) = (unix_secs(self.built_at), unix_secs(dir_mtime)) else {
            return false;
        };
        built > mtime
    }
}

fn unix_secs(t: SystemTime) -> Option<u64> {
    t.duration_since(UNIX_EPOCH).ok().map(|d| d.as_secs())
}

/// Lists and filters files in a wiki's dump date directories.
///
/// The in-memory cache is private to one process; cross-process coherence
/// comes from mtime invalidation, not sharing.
pub struct DumpCatalog {
    wiki: WikiId,
    wiki_dir: PathBuf,
    cache: Mutex<HashMap<String, CacheSlot>>,
}

impl DumpCatalog {
    /// Catalog over `<root>/<wiki>`.
    #[must_use]
    pub fn new(public_root: &Path, wiki: WikiId) -> Self {
        let wiki_dir = public_root.join(wiki.as_str());
        Self {
            wiki,
            wiki_dir,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The wiki this catalog serves.
    #[must_use]
    pub fn wiki(&self) -> &WikiId {
        &self.wiki
    }

    /// Absolute path of one date directory.
    #[must_use]
    pub fn date_dir(&self, date: &DumpDate) -> PathBuf {
        self.wiki_dir.join(date.as_str())
    }

    /// All dump dates with a directory under this wiki, ascending.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the wiki directory is unreadable.
    pub fn dates(&self) -> io::Result<Vec<DumpDate>> {
        let mut dates = Vec::new();
        for entry in std::fs::read_dir(&self.wiki_dir)? {
            let entry = entry?;
            // Follows symlinks so aliased date directories still count;
            // dangling links are simply not directories.
            let is_dir = std::fs::metadata(entry.path())
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Ok(date) = DumpDate::parse(&entry.file_name().to_string_lossy()) {
                dates.push(date);
            }
        }
        dates.sort();
        Ok(dates)
    }

    /// List one date directory's files, parsed against the naming scheme.
    ///
    /// Non-canonical entries are skipped with a debug log. Results are in
    /// natural (human) filename order.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the directory is unreadable.
    pub fn list_files(&self, date: &DumpDate) -> io::Result<Vec<CatalogEntry>> {
        let dir = self.date_dir(date);
        let dir_mtime = std::fs::metadata(&dir)?.modified()?;

        {
            let cache = self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(slot) = cache.get(date.as_str()) {
                if slot.is_fresh(dir_mtime) {
                    return Ok(slot.entries.clone());
                }
            }
        }

        let mut entries = Vec::new();
        for dirent in std::fs::read_dir(&dir)? {
            let dirent = dirent?;
            if !dirent.file_type()?.is_file() {
                continue;
            }
            let file_name = dirent.file_name().to_string_lossy().into_owned();
            let (stem, marker) = split_marker(&file_name);
            match DumpFileName::parse(stem) {
                Ok(name) => entries.push(CatalogEntry {
                    name,
                    file_name: file_name.clone(),
                    marker: marker.map(str::to_string),
                }),
                Err(err) => {
                    tracing::debug!(wiki = %self.wiki, file = file_name, %err, "skipping non-canonical file");
                }
            }
        }
        entries.sort_by(|a, b| natural_cmp(&a.file_name, &b.file_name));

        let mut cache = self.cache.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        cache.insert(
            date.as_str().to_string(),
            CacheSlot {
                dir_mtime,
                built_at: SystemTime::now(),
                entries: entries.clone(),
            },
        );
        Ok(entries)
    }

    /// List files matching a filter, in natural filename order.
    ///
    /// # Errors
    ///
    /// Returns the underlying I/O error if the directory is unreadable.
    pub fn filter(&self, date: &DumpDate, filter: &FileFilter) -> io::Result<Vec<DumpFileName>> {
        Ok(self
            .list_files(date)?
            .into_iter()
            .filter(|e| filter.admits(e))
            .map(|e| e.name)
            .collect())
    }
}

/// Split a trailing quarantine marker suffix off a raw file name.
fn split_marker(file_name: &str) -> (&str, Option<&'static str>) {
    for marker in MARKER_SUFFIXES {
        if let Some(stem) = file_name.strip_suffix(marker) {
            return (stem, Some(marker));
        }
    }
    (file_name, None)
}
