//! The canonical dump filename grammar.
//!
//! Rendered form, fixed separator and suffix order:
//!
//! ```text
//! <wiki>-<date>-<dumpname>[<part>][.<filetype>][-p<first>p<last>].<ext>[.inprog][-tmp]
//! ```
//!
//! Parsing peels the suffixes off in reverse order: `-tmp`, `.inprog`,
//! extension, checkpoint segment (anchored immediately before the
//! extension), secondary filetype segment, then a trailing numeric run on
//! the dumpname as the part number. A filename without the `<wiki>-<date>-`
//! prefix is accepted and the whole stem is treated as the dumpname, which
//! lets the same grammar drive generic file manipulation.
//!
//! Known ambiguity, inherited from the scheme itself: a dumpname that
//! legitimately ends in a non-zero digit run is indistinguishable from a
//! part-numbered file (`sometable2` parses as dumpname `sometable`, part 2).
//! A run with a leading zero is never a part number, so names like
//! `all-titles-in-ns0` survive intact.

use std::cmp::Ordering;

use dumpmill_types::{DumpDate, PageRange, WikiId};

use crate::error::{NamingError, Result};

const TMP_SUFFIX: &str = "-tmp";
const INPROG_SUFFIX: &str = ".inprog";

/// Parsed or constructed representation of one dump output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpFileName {
    /// `<wiki>-<date>-` prefix, absent for bare names.
    pub prefix: Option<(WikiId, DumpDate)>,
    /// Base of the output filename, e.g. `pages-meta-history`.
    pub dumpname: String,
    /// Secondary file type segment, e.g. `xml` in `....xml.bz2`.
    pub filetype: Option<String>,
    /// Final extension, e.g. `bz2`.
    pub ext: String,
    /// 1-based part number for chunked jobs.
    pub part: Option<u32>,
    /// Page-id range for checkpoint files.
    pub checkpoint: Option<PageRange>,
    /// `-tmp` scratch file.
    pub temp: bool,
    /// `.inprog` file still being written.
    pub inprog: bool,
}

impl DumpFileName {
    /// Construct a whole-job filename for a (wiki, date) pair.
    pub fn build(
        wiki: &WikiId,
        date: &DumpDate,
        dumpname: impl Into<String>,
        filetype: Option<&str>,
        ext: impl Into<String>,
    ) -> Self {
        Self {
            prefix: Some((wiki.clone(), date.clone())),
            dumpname: dumpname.into(),
            filetype: filetype.map(str::to_string),
            ext: ext.into(),
            part: None,
            checkpoint: None,
            temp: false,
            inprog: false,
        }
    }

    /// Set the part number. Parts are 1-based.
    ///
    /// # Errors
    ///
    /// Returns [`NamingError::ZeroPart`] for part 0.
    pub fn with_part(mut self, part: u32) -> Result<Self> {
        if part == 0 {
            return Err(NamingError::ZeroPart(self.dumpname));
        }
        self.part = Some(part);
        Ok(self)
    }

    /// Set the checkpoint page range.
    #[must_use]
    pub fn with_checkpoint(mut self, range: PageRange) -> Self {
        self.checkpoint = Some(range);
        self
    }

    /// Mark as a `-tmp` scratch file.
    #[must_use]
    pub fn as_temp(mut self) -> Self {
        self.temp = true;
        self
    }

    /// Mark as an `.inprog` file still being written.
    #[must_use]
    pub fn as_inprog(mut self) -> Self {
        self.inprog = true;
        self
    }

    /// Whether this is a checkpoint file (a specific recorded page range,
    /// independent of whether chunking is enabled).
    #[must_use]
    pub fn is_checkpoint(&self) -> bool {
        self.checkpoint.is_some()
    }

    /// Render the canonical filename.
    #[must_use]
    pub fn file_name(&self) -> String {
        let mut s = String::new();
        if let Some((wiki, date)) = &self.prefix {
            s.push_str(wiki.as_str());
            s.push('-');
            s.push_str(date.as_str());
            s.push('-');
        }
        s.push_str(&self.dumpname);
        if let Some(part) = self.part {
            s.push_str(&part.to_string());
        }
        if let Some(ft) = &self.filetype {
            s.push('.');
            s.push_str(ft);
        }
        if let Some(range) = self.checkpoint {
            s.push('-');
            s.push_str(&range.to_string());
        }
        s.push('.');
        s.push_str(&self.ext);
        if self.inprog {
            s.push_str(INPROG_SUFFIX);
        }
        if self.temp {
            s.push_str(TMP_SUFFIX);
        }
        s
    }

    /// Parse a canonical filename.
    ///
    /// # Errors
    ///
    /// Returns [`NamingError::NotCanonical`] when the name lacks an
    /// extension or a checkpoint segment is malformed, and
    /// [`NamingError::InvertedRange`] for a checkpoint whose first page id
    /// exceeds its last.
    pub fn parse(name: &str) -> Result<Self> {
        let original = name;
        let mut rest = name;

        let temp = rest.ends_with(TMP_SUFFIX);
        if temp {
            rest = &rest[..rest.len() - TMP_SUFFIX.len()];
        }
        let inprog = rest.ends_with(INPROG_SUFFIX);
        if inprog {
            rest = &rest[..rest.len() - INPROG_SUFFIX.len()];
        }

        let (stem, ext) = split_ext(rest)
            .ok_or_else(|| NamingError::NotCanonical(original.to_string()))?;

        let (stem, checkpoint) = split_checkpoint(stem)?;
        let (stem, filetype) = split_filetype(stem);
        let (prefix, dumpname) = split_prefix(stem);
        let (dumpname, part) = split_part(dumpname);

        if dumpname.is_empty() {
            return Err(NamingError::NotCanonical(original.to_string()));
        }

        Ok(Self {
            prefix,
            dumpname: dumpname.to_string(),
            filetype: filetype.map(str::to_string),
            ext: ext.to_string(),
            part,
            checkpoint,
            temp,
            inprog,
        })
    }

    fn sort_key(&self) -> (&str, Option<u32>, Option<u64>, Option<u64>) {
        (
            &self.dumpname,
            self.part,
            self.checkpoint.map(|c| c.first),
            self.checkpoint.map(|c| c.last),
        )
    }
}

/// Files order by (dumpname, part, first page id, last page id); a file
/// without a part or range sorts before one that has it.
impl Ord for DumpFileName {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl PartialOrd for DumpFileName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for DumpFileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Split off the final extension. `None` when the name has no dot or an
/// empty extension.
fn split_ext(s: &str) -> Option<(&str, &str)> {
    let dot = s.rfind('.')?;
    let (stem, ext) = (&s[..dot], &s[dot + 1..]);
    if stem.is_empty() || ext.is_empty() || !ext.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return None;
    }
    Some((stem, ext))
}

/// Split a trailing `-p<first>p<last>` checkpoint segment off the stem.
fn split_checkpoint(stem: &str) -> Result<(&str, Option<PageRange>)> {
    let Some(idx) = stem.rfind("-p") else {
        return Ok((stem, None));
    };
    let tail = &stem[idx + 2..];
    let Some(p) = tail.find('p') else {
        return Ok((stem, None));
    };
    let (first_s, last_s) = (&tail[..p], &tail[p + 1..]);
    if first_s.is_empty()
        || last_s.is_empty()
        || !first_s.bytes().all(|b| b.is_ascii_digit())
        || !last_s.bytes().all(|b| b.is_ascii_digit())
    {
        return Ok((stem, None));
    }
    let first: u64 = first_s
        .parse()
        .map_err(|_| NamingError::NotCanonical(stem.to_string()))?;
    let last: u64 = last_s
        .parse()
        .map_err(|_| NamingError::NotCanonical(stem.to_string()))?;
    let range = PageRange::new(first, last)?;
    Ok((&stem[..idx], Some(range)))
}

/// Split a trailing `.<filetype>` segment (e.g. `xml` in `foo.xml`).
fn split_filetype(stem: &str) -> (&str, Option<&str>) {
    let Some(dot) = stem.rfind('.') else {
        return (stem, None);
    };
    let (head, ft) = (&stem[..dot], &stem[dot + 1..]);
    if head.is_empty() || ft.is_empty() || !ft.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return (stem, None);
    }
    (head, Some(ft))
}

/// Split a leading `<wiki>-<date>-` prefix. Falls back to no prefix so bare
/// dumpnames still parse.
fn split_prefix(stem: &str) -> (Option<(WikiId, DumpDate)>, &str) {
    let Some(i) = stem.find('-') else {
        return (None, stem);
    };
    let wiki = &stem[..i];
    let after = &stem[i + 1..];
    let Some(j) = after.find('-') else {
        return (None, stem);
    };
    let Ok(date) = DumpDate::parse(&after[..j]) else {
        return (None, stem);
    };
    if wiki.is_empty() || after[j + 1..].is_empty() {
        return (None, stem);
    }
    (Some((WikiId::new(wiki), date)), &after[j + 1..])
}

/// Split a trailing numeric run off the dumpname as the part number.
///
/// A run with a leading zero (or the whole name being digits) is left in
/// the dumpname; parts are 1-based with no leading zeros.
fn split_part(dumpname: &str) -> (&str, Option<u32>) {
    let digits = dumpname
        .bytes()
        .rev()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 || digits == dumpname.len() {
        return (dumpname, None);
    }
    let split = dumpname.len() - digits;
    let run = &dumpname[split..];
    if run.starts_with('0') {
        return (dumpname, None);
    }
    match run.parse::<u32>() {
        Ok(part) => (&dumpname[..split], Some(part)),
        Err(_) => (dumpname, None),
    }
}
