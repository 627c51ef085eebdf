//! Run manifest persistence.
//!
//! The manifest lives inside the date directory next to the dump output so
//! any host with the shared filesystem can resume the run. Writes go to a
//! `-tmp` sibling and are renamed into place, so a concurrent status reader
//! never observes a torn manifest.

use std::path::{Path, PathBuf};

use dumpmill_types::{JobStatus, RunManifest, RunStatus};

use crate::error::StateError;

/// Manifest file name inside each date directory.
pub const MANIFEST_FILE: &str = "dumpruninfo.json";

/// Loads and saves the run manifest for one date directory.
#[derive(Debug, Clone)]
pub struct RunStore {
    date_dir: PathBuf,
}

impl RunStore {
    /// Store over one date directory.
    pub fn new(date_dir: impl Into<PathBuf>) -> Self {
        Self {
            date_dir: date_dir.into(),
        }
    }

    /// Path of the manifest file.
    #[must_use]
    pub fn manifest_path(&self) -> PathBuf {
        self.date_dir.join(MANIFEST_FILE)
    }

    /// The date directory this store serves.
    #[must_use]
    pub fn date_dir(&self) -> &Path {
        &self.date_dir
    }

    /// Load the manifest; `Ok(None)` when no run has been recorded yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on I/O failure or a malformed manifest.
    pub fn load(&self) -> Result<Option<RunManifest>, StateError> {
        let path = self.manifest_path();
        let content = match std::fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Persist the manifest atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on I/O or serialization failure.
    pub fn save(&self, manifest: &RunManifest) -> Result<(), StateError> {
        std::fs::create_dir_all(&self.date_dir)?;
        let path = self.manifest_path();
        let tmp = self.date_dir.join(format!("{MANIFEST_FILE}-tmp"));
        let json = serde_json::to_string_pretty(manifest)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Update one job's status and progress line, timestamping the change,
    /// and persist immediately so status watchers see the transition.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on I/O or serialization failure.
    pub fn update_job(
        &self,
        manifest: &mut RunManifest,
        name: &str,
        status: JobStatus,
        progress: &str,
    ) -> Result<(), StateError> {
        if let Some(job) = manifest.job_mut(name) {
            job.status = status;
            job.updated_at = now_rfc3339();
            job.progress = progress.to_string();
        }
        self.save(manifest)
    }

    /// Set the run status and persist.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on I/O or serialization failure.
    pub fn set_run_status(
        &self,
        manifest: &mut RunManifest,
        status: RunStatus,
    ) -> Result<(), StateError> {
        manifest.status = status;
        self.save(manifest)
    }

    /// Mark an existing run `Aborted` (stale-lock reclaim path). A missing
    /// manifest is a no-op: there is no run to annotate.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`] on I/O or serialization failure.
    pub fn mark_aborted(&self) -> Result<(), StateError> {
        if let Some(mut manifest) = self.load()? {
            manifest.status = RunStatus::Aborted;
            self.save(&manifest)?;
        }
        Ok(())
    }
}

/// Current UTC time, RFC 3339.
#[must_use]
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dumpmill_types::JobRecord;
    use tempfile::TempDir;

    fn manifest() -> RunManifest {
        RunManifest::new(
            "enwiki",
            "20240101",
            vec![
                JobRecord::waiting("xmlstubsdump", now_rfc3339()),
                JobRecord::waiting("articlesdump", now_rfc3339()),
            ],
        )
    }

    #[test]
    fn test_load_of_missing_manifest_is_none() {
        let dir = TempDir::new().unwrap();
        let store = RunStore::new(dir.path().join("20240101"));
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_save_then_load_roundtrips() {
        let dir = TempDir::new().unwrap();
        let store = RunStore::new(dir.path().join("20240101"));
        let m = manifest();
        store.save(&m).unwrap();
        assert_eq!(store.load().unwrap().unwrap(), m);
        // No -tmp residue after the rename.
        assert!(!store.date_dir().join(format!("{MANIFEST_FILE}-tmp")).exists());
    }

    #[test]
    fn test_update_job_persists_the_transition() {
        let dir = TempDir::new().unwrap();
        let store = RunStore::new(dir.path().join("20240101"));
        let mut m = manifest();
        store
            .update_job(&mut m, "xmlstubsdump", JobStatus::Done, "3 parts written")
            .unwrap();
        let back = store.load().unwrap().unwrap();
        let job = back.job("xmlstubsdump").unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, "3 parts written");
    }

    #[test]
    fn test_mark_aborted_stamps_the_run() {
        let dir = TempDir::new().unwrap();
        let store = RunStore::new(dir.path().join("20240101"));
        let m = manifest();
        store.save(&m).unwrap();
        store.mark_aborted().unwrap();
        assert_eq!(store.load().unwrap().unwrap().status, RunStatus::Aborted);
    }

    #[test]
    fn test_mark_aborted_without_manifest_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let store = RunStore::new(dir.path().join("20240101"));
        store.mark_aborted().unwrap();
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_malformed_manifest_is_an_error() {
        let dir = TempDir::new().unwrap();
        let date_dir = dir.path().join("20240101");
        std::fs::create_dir_all(&date_dir).unwrap();
        std::fs::write(date_dir.join(MANIFEST_FILE), "{not json").unwrap();
        let store = RunStore::new(&date_dir);
        assert!(matches!(store.load(), Err(StateError::Json(_))));
    }
}
