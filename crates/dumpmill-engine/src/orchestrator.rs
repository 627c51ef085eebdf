//! The per-(wiki, date) run driver.
//!
//! Acquires the run lock, assembles or resumes the manifest, and drives the
//! job list strictly sequentially. One job's failure never aborts the run;
//! independent jobs still produce their output and only the summary and
//! run status reflect the failure. Dependents of a failed job are left
//! waiting rather than cascaded into failure, so a rerun after the fix
//! picks them up automatically.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use dumpmill_exec::PipelineRunner;
use dumpmill_files::{DumpCatalog, DumpFileName};
use dumpmill_state::{LockError, LockManager, RunStore};
use dumpmill_state::store::now_rfc3339;
use dumpmill_types::{DumpDate, JobRecord, JobStatus, RunManifest, RunStatus, WikiId};
use tracing::{debug, info, warn};

use crate::config::DumpConfig;
use crate::error::DumpError;
use crate::job::{DumpJob, Job, JobContext};
use crate::jobs::standard_jobs;
use crate::notify::{LogNotifier, Notifier};
use crate::prefetch::PrefetchResolver;

/// Outcome counts for one orchestrator pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub done: usize,
    pub failed: usize,
    pub waiting: usize,
    pub skipped: usize,
    /// A maintenance or exit marker stopped the run between jobs.
    pub aborted_early: bool,
}

pub struct Orchestrator<'a> {
    config: &'a DumpConfig,
    wiki: WikiId,
    date: DumpDate,
    dry_run: bool,
    notifier: Arc<dyn Notifier>,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(config: &'a DumpConfig, wiki: WikiId, date: DumpDate) -> Self {
        Self {
            config,
            wiki,
            date,
            dry_run: false,
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Print planned pipelines instead of executing them.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Run the standard job list for this wiki and date.
    ///
    /// # Errors
    ///
    /// Returns an error on lock contention or infrastructure failure;
    /// individual job failures are reported through the summary instead.
    pub async fn run(&self) -> anyhow::Result<RunSummary> {
        self.run_jobs(standard_jobs(self.config)).await
    }

    /// Run an explicit job list (single-job reruns, tests).
    ///
    /// # Errors
    ///
    /// As [`Orchestrator::run`].
    pub async fn run_jobs(&self, job_list: Vec<Box<dyn DumpJob>>) -> anyhow::Result<RunSummary> {
        let lock_manager =
            LockManager::new(&self.config.private_root, self.config.run_marker_var.clone());
        let lock = match lock_manager.lock(&self.wiki, &self.date) {
            Ok(lock) => lock,
            Err(LockError::AlreadyLocked { path }) => {
                return Err(DumpError::LockContention { path }.into());
            }
            Err(e) => return Err(e).context("acquiring run lock"),
        };

        let result = self.drive(job_list).await;
        if let Err(err) = lock.unlock().await {
            warn!(%err, "failed to remove run lock");
        }
        result
    }

    async fn drive(&self, job_list: Vec<Box<dyn DumpJob>>) -> anyhow::Result<RunSummary> {
        let store = RunStore::new(self.config.date_dir(&self.wiki, &self.date));
        let mut manifest = match store.load()? {
            Some(manifest) => manifest,
            None => RunManifest::new(
                self.wiki.as_str(),
                self.date.as_str(),
                job_list
                    .iter()
                    .map(|j| JobRecord::waiting(j.name(), now_rfc3339()))
                    .collect(),
            ),
        };
        for job in &job_list {
            if manifest.job(job.name()).is_none() {
                manifest
                    .jobs
                    .push(JobRecord::waiting(job.name(), now_rfc3339()));
            }
        }

        let mut jobs: Vec<Job> = job_list.into_iter().map(Job::new).collect();
        for job in &mut jobs {
            if let Some(record) = manifest.job(job.name()) {
                job.set_status(record.status);
            }
        }

        if !self.dry_run {
            store.set_run_status(&mut manifest, RunStatus::InProgress)?;
        }

        let catalog = DumpCatalog::new(&self.config.public_root, self.wiki.clone());
        let runner = PipelineRunner::new().with_env(self.config.run_marker_var.clone(), "1");
        let prefetch = PrefetchResolver::new(self.config, &catalog, &runner);
        let ctx = JobContext {
            config: self.config,
            wiki: &self.wiki,
            date: &self.date,
            catalog: &catalog,
            runner: &runner,
            prefetch: &prefetch,
            dry_run: self.dry_run,
        };

        let mut failures = 0usize;
        let mut aborted_early = false;

        for i in 0..jobs.len() {
            if self.config.maintenance_path().exists() || self.config.exit_path().exists() {
                warn!(wiki = %self.wiki, "maintenance or exit marker present, stopping run");
                aborted_early = true;
                break;
            }

            let name = jobs[i].name();
            if manifest.job_done(name) {
                debug!(job = name, "already done, skipping");
                jobs[i].set_status(JobStatus::Done);
                continue;
            }
            if jobs[i].status() == JobStatus::Skipped {
                debug!(job = name, "operator skipped");
                continue;
            }

            // Manifest records first, then the in-memory jobs on top: a
            // single-job rerun still sees prerequisite statuses recorded
            // by earlier passes.
            let mut statuses: HashMap<String, JobStatus> = manifest
                .jobs
                .iter()
                .map(|r| (r.name.clone(), r.status))
                .collect();
            for j in &jobs {
                statuses.insert(j.name().to_string(), j.status());
            }

            // A failed prerequisite must not cascade: the dependent stays
            // waiting so the next run after the fix retries it, and the
            // failure count reflects only the job that actually broke.
            if jobs[i]
                .inner()
                .prerequisites()
                .iter()
                .any(|p| statuses.get(*p) == Some(&JobStatus::Failed))
            {
                info!(job = name, "prerequisite failed, leaving job waiting");
                continue;
            }

            if !self.dry_run {
                store.update_job(&mut manifest, name, JobStatus::InProgress, "started")?;
            }

            match jobs[i].dump(&ctx, &statuses).await {
                Ok(files) => {
                    info!(job = name, files = files.len(), "job done");
                    if !self.dry_run {
                        store.update_job(
                            &mut manifest,
                            name,
                            JobStatus::Done,
                            jobs[i].progress(),
                        )?;
                        self.refresh_latest(&files);
                    }
                }
                Err(err) if err.is_soft() => {
                    info!(job = name, %err, "not ready, will retry on a later run");
                    if !self.dry_run {
                        store.update_job(
                            &mut manifest,
                            name,
                            JobStatus::Waiting,
                            jobs[i].progress(),
                        )?;
                    }
                }
                Err(err) => {
                    failures += 1;
                    warn!(job = name, %err, "job failed");
                    if !self.dry_run {
                        store.update_job(
                            &mut manifest,
                            name,
                            JobStatus::Failed,
                            jobs[i].progress(),
                        )?;
                    }
                    // One notification per wiki per run, at the first
                    // hard failure.
                    if failures == 1 && self.config.notify_admin {
                        self.notifier.notify(
                            &self.wiki,
                            &self.date,
                            &format!("job {name} failed: {err}"),
                        );
                    }
                }
            }
        }

        if !self.dry_run && !aborted_early {
            let run_status = if failures == 0 {
                RunStatus::Done
            } else {
                RunStatus::Failed
            };
            store.set_run_status(&mut manifest, run_status)?;
        }

        let mut summary = RunSummary {
            aborted_early,
            ..RunSummary::default()
        };
        for job in &jobs {
            match job.status() {
                JobStatus::Done => summary.done += 1,
                JobStatus::Failed => summary.failed += 1,
                JobStatus::Skipped => summary.skipped += 1,
                JobStatus::Waiting | JobStatus::InProgress => summary.waiting += 1,
            }
        }
        Ok(summary)
    }

    /// Point the wiki's `latest/` aliases at this run's published files.
    fn refresh_latest(&self, files: &[DumpFileName]) {
        if files.is_empty() {
            return;
        }
        let latest_dir = self.config.latest_dir(&self.wiki);
        if let Err(err) = std::fs::create_dir_all(&latest_dir) {
            warn!(%err, "cannot create latest/ directory");
            return;
        }
        for name in files {
            let mut bare = name.clone();
            bare.prefix = None;
            let link = latest_dir.join(format!("{}-latest-{}", self.wiki, bare.file_name()));
            let target = PathBuf::from("..")
                .join(self.date.as_str())
                .join(name.file_name());
            let _ = std::fs::remove_file(&link);
            if let Err(err) = std::os::unix::fs::symlink(&target, &link) {
                warn!(link = %link.display(), %err, "cannot refresh latest link");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DumpError;
    use crate::job::JobSpec;
    use crate::notify::test_support::RecordingNotifier;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct ScriptedJob {
        name: &'static str,
        prereqs: &'static [&'static str],
        spec: JobSpec,
        fail: bool,
    }

    impl ScriptedJob {
        fn ok(name: &'static str, prereqs: &'static [&'static str]) -> Box<dyn DumpJob> {
            Box::new(Self {
                name,
                prereqs,
                spec: JobSpec::default(),
                fail: false,
            })
        }

        fn failing(name: &'static str) -> Box<dyn DumpJob> {
            Box::new(Self {
                name,
                prereqs: &[],
                spec: JobSpec::default(),
                fail: true,
            })
        }
    }

    #[async_trait]
    impl DumpJob for ScriptedJob {
        fn name(&self) -> &'static str {
            self.name
        }
        fn dump_name(&self) -> &'static str {
            self.name
        }
        fn file_type(&self) -> Option<&'static str> {
            None
        }
        fn file_ext(&self) -> &'static str {
            "txt"
        }
        fn detail(&self) -> String {
            "scripted".to_string()
        }
        fn prerequisites(&self) -> &[&'static str] {
            self.prereqs
        }
        fn spec(&self) -> &JobSpec {
            &self.spec
        }
        async fn run(&self, ctx: &JobContext<'_>) -> Result<Vec<DumpFileName>, DumpError> {
            if self.fail {
                return Err(DumpError::CommandFailed {
                    argv: self.name.to_string(),
                    code: Some(1),
                });
            }
            if ctx.dry_run {
                return Ok(Vec::new());
            }
            let name = DumpFileName::build(ctx.wiki, ctx.date, self.name, None, "txt");
            std::fs::create_dir_all(ctx.date_dir())?;
            std::fs::write(ctx.path_of(&name.clone().as_inprog()), b"out")?;
            Ok(vec![name])
        }
    }

    struct World {
        _dir: TempDir,
        config: DumpConfig,
    }

    fn world() -> World {
        let dir = TempDir::new().unwrap();
        let mut config =
            DumpConfig::with_roots(dir.path().join("public"), dir.path().join("private"));
        config.notify_admin = true;
        World { _dir: dir, config }
    }

    fn ids() -> (WikiId, DumpDate) {
        (WikiId::new("testwiki"), DumpDate::parse("20240101").unwrap())
    }

    #[tokio::test]
    async fn test_successful_run_publishes_and_links() {
        let world = world();
        let (wiki, date) = ids();
        let orch = Orchestrator::new(&world.config, wiki.clone(), date.clone());
        let summary = orch
            .run_jobs(vec![
                ScriptedJob::ok("a", &[]),
                ScriptedJob::ok("b", &["a"]),
            ])
            .await
            .unwrap();
        assert_eq!(summary.done, 2);
        assert_eq!(summary.failed, 0);

        let date_dir = world.config.date_dir(&wiki, &date);
        assert!(date_dir.join("testwiki-20240101-a.txt").exists());
        let manifest = RunStore::new(&date_dir).load().unwrap().unwrap();
        assert_eq!(manifest.status, RunStatus::Done);
        assert!(manifest.job_done("a"));
        assert!(manifest.job_done("b"));

        let link = world
            .config
            .latest_dir(&wiki)
            .join("testwiki-latest-a.txt");
        assert!(link.symlink_metadata().unwrap().file_type().is_symlink());
        // The lock is gone.
        let lock_path = LockManager::new(&world.config.private_root, "X").lock_path(&wiki, &date);
        assert!(!lock_path.exists());
    }

    #[tokio::test]
    async fn test_failed_job_leaves_dependents_waiting_and_notifies_once() {
        let world = world();
        let (wiki, date) = ids();
        let notifier = Arc::new(RecordingNotifier::default());
        let orch = Orchestrator::new(&world.config, wiki.clone(), date.clone())
            .with_notifier(notifier.clone());
        let summary = orch
            .run_jobs(vec![
                ScriptedJob::failing("a"),
                ScriptedJob::ok("b", &["a"]),
                ScriptedJob::ok("c", &["a"]),
            ])
            .await
            .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.waiting, 2);

        let manifest = RunStore::new(world.config.date_dir(&wiki, &date))
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(manifest.status, RunStatus::Failed);
        assert_eq!(manifest.job("a").unwrap().status, JobStatus::Failed);
        assert_eq!(manifest.job("b").unwrap().status, JobStatus::Waiting);
        assert_eq!(manifest.job("c").unwrap().status, JobStatus::Waiting);
        assert_eq!(manifest.failure_count(), 1);
        assert_eq!(notifier.messages.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_resume_skips_done_jobs() {
        let world = world();
        let (wiki, date) = ids();
        let orch = Orchestrator::new(&world.config, wiki.clone(), date.clone());
        orch.run_jobs(vec![ScriptedJob::failing("a"), ScriptedJob::ok("b", &[])])
            .await
            .unwrap();

        // Second pass: b already done, a retried (still failing).
        let summary = orch
            .run_jobs(vec![ScriptedJob::failing("a"), ScriptedJob::ok("b", &[])])
            .await
            .unwrap();
        assert_eq!(summary.done, 1);
        assert_eq!(summary.failed, 1);
        // b's output published exactly once; a second run would have failed
        // publishing over the missing inprog file.
    }

    #[tokio::test]
    async fn test_lock_contention_aborts_immediately() {
        let world = world();
        let (wiki, date) = ids();
        let manager = LockManager::new(&world.config.private_root, "DUMPMILL_RUN");
        let lock = manager.lock(&wiki, &date).unwrap();

        let orch = Orchestrator::new(&world.config, wiki.clone(), date.clone());
        let err = orch
            .run_jobs(vec![ScriptedJob::ok("a", &[])])
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DumpError>(),
            Some(DumpError::LockContention { .. })
        ));
        lock.unlock().await.unwrap();
    }

    #[tokio::test]
    async fn test_exit_marker_stops_between_jobs() {
        let world = world();
        let (wiki, date) = ids();
        std::fs::create_dir_all(&world.config.private_root).unwrap();
        std::fs::write(world.config.exit_path(), b"").unwrap();

        let orch = Orchestrator::new(&world.config, wiki, date);
        let summary = orch
            .run_jobs(vec![ScriptedJob::ok("a", &[])])
            .await
            .unwrap();
        assert!(summary.aborted_early);
        assert_eq!(summary.done, 0);
        assert_eq!(summary.waiting, 1);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let world = world();
        let (wiki, date) = ids();
        let orch =
            Orchestrator::new(&world.config, wiki.clone(), date.clone()).with_dry_run(true);
        orch.run_jobs(vec![ScriptedJob::ok("a", &[])]).await.unwrap();
        let date_dir = world.config.date_dir(&wiki, &date);
        assert!(RunStore::new(&date_dir).load().unwrap().is_none());
        assert!(!date_dir.join("testwiki-20240101-a.txt").exists());
    }
}
