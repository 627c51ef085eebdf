//! Run manifest model: the persisted per-job status record that lets a
//! later invocation resume a partially completed run.

use serde::{Deserialize, Serialize};

use crate::status::{JobStatus, RunStatus};

/// One job's entry in the run manifest.
///
/// `updated_at` is an ISO-8601 UTC string (e.g. `"2026-01-15T10:00:00Z"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: String,
    pub status: JobStatus,
    pub updated_at: String,
    /// Free-text progress line shown on status displays.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub progress: String,
}

impl JobRecord {
    /// A fresh `Waiting` record for a named job.
    #[must_use]
    pub fn waiting(name: impl Into<String>, updated_at: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: JobStatus::Waiting,
            updated_at: updated_at.into(),
            progress: String::new(),
        }
    }
}

/// The persisted state of one wiki/date run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunManifest {
    pub wiki: String,
    pub date: String,
    pub status: RunStatus,
    pub jobs: Vec<JobRecord>,
}

impl RunManifest {
    /// A new in-progress manifest with every job `Waiting`.
    #[must_use]
    pub fn new(wiki: impl Into<String>, date: impl Into<String>, jobs: Vec<JobRecord>) -> Self {
        Self {
            wiki: wiki.into(),
            date: date.into(),
            status: RunStatus::InProgress,
            jobs,
        }
    }

    /// Find a job record by name.
    #[must_use]
    pub fn job(&self, name: &str) -> Option<&JobRecord> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Find a job record by name, mutably.
    pub fn job_mut(&mut self, name: &str) -> Option<&mut JobRecord> {
        self.jobs.iter_mut().find(|j| j.name == name)
    }

    /// Whether the named job completed successfully in this run.
    #[must_use]
    pub fn job_done(&self, name: &str) -> bool {
        self.job(name).is_some_and(|j| j.status == JobStatus::Done)
    }

    /// Count of jobs in `Failed` status.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.status == JobStatus::Failed)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> RunManifest {
        RunManifest::new(
            "enwiki",
            "20240101",
            vec![
                JobRecord::waiting("xmlstubsdump", "2026-01-15T10:00:00Z"),
                JobRecord::waiting("articlesdump", "2026-01-15T10:00:00Z"),
            ],
        )
    }

    #[test]
    fn test_new_manifest_starts_in_progress_and_waiting() {
        let m = manifest();
        assert_eq!(m.status, RunStatus::InProgress);
        assert!(m.jobs.iter().all(|j| j.status == JobStatus::Waiting));
        assert_eq!(m.failure_count(), 0);
    }

    #[test]
    fn test_job_lookup_and_done_check() {
        let mut m = manifest();
        assert!(!m.job_done("xmlstubsdump"));
        m.job_mut("xmlstubsdump").unwrap().status = JobStatus::Done;
        assert!(m.job_done("xmlstubsdump"));
        assert!(m.job("missing").is_none());
    }

    #[test]
    fn test_manifest_json_roundtrip() {
        let m = manifest();
        let json = serde_json::to_string_pretty(&m).unwrap();
        let back: RunManifest = serde_json::from_str(&json).unwrap();
        assert_eq!(m, back);
    }

    #[test]
    fn test_empty_progress_is_omitted_from_json() {
        let m = manifest();
        let json = serde_json::to_string(&m).unwrap();
        assert!(!json.contains("progress"));
    }
}
