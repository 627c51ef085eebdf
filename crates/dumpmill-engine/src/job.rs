//! The dump job trait and per-job state machine.
//!
//! A job's `run` body does the actual work; the [`Job`] wrapper owns the
//! status lifecycle around it: prerequisite checks before, output
//! verification and publish after. Job statuses move
//! `waiting → in_progress → {done, failed}`; `skipped` is an operator
//! override set through the CLI, never by the engine.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::anyhow;
use async_trait::async_trait;
use dumpmill_exec::PipelineRunner;
use dumpmill_files::{DumpCatalog, DumpFileName};
use dumpmill_types::{DumpDate, JobStatus, PageRange, WikiId};

use crate::config::DumpConfig;
use crate::error::DumpError;
use crate::prefetch::PrefetchResolver;
use crate::truncation;

/// Per-job run shape, fixed at construction. Re-running a slice of a job
/// (one part, one checkpoint file) builds a new spec; specs are never
/// patched after the job list is assembled.
#[derive(Debug, Clone, Default)]
pub struct JobSpec {
    pub chunks_enabled: bool,
    pub checkpoints_enabled: bool,
    pub fixed_part: Option<u32>,
    pub fixed_checkpoint: Option<PageRange>,
}

impl JobSpec {
    /// The parts this spec covers: the fixed part if any, every configured
    /// part when chunking is on, or the single whole-job pass.
    #[must_use]
    pub fn parts(&self, config: &DumpConfig) -> Vec<Option<u32>> {
        if let Some(part) = self.fixed_part {
            return vec![Some(part)];
        }
        if self.chunks_enabled && config.parts.enabled && !config.parts.page_bands.is_empty() {
            return config
                .parts
                .part_ranges()
                .into_iter()
                .map(|(part, _, _)| Some(part))
                .collect();
        }
        vec![None]
    }
}

/// Everything a job body needs, borrowed for the duration of the run.
pub struct JobContext<'a> {
    pub config: &'a DumpConfig,
    pub wiki: &'a WikiId,
    pub date: &'a DumpDate,
    pub catalog: &'a DumpCatalog,
    pub runner: &'a PipelineRunner,
    pub prefetch: &'a PrefetchResolver<'a>,
    pub dry_run: bool,
}

impl JobContext<'_> {
    /// The published directory this run writes into.
    #[must_use]
    pub fn date_dir(&self) -> PathBuf {
        self.config.date_dir(self.wiki, self.date)
    }

    /// Absolute path of a dump file in this run's date directory.
    #[must_use]
    pub fn path_of(&self, name: &DumpFileName) -> PathBuf {
        self.date_dir().join(name.file_name())
    }
}

/// One dump job. Implementations build their pipelines from the context
/// and write outputs under `.inprog` names; the [`Job`] wrapper verifies
/// and publishes them.
#[async_trait]
pub trait DumpJob: Send + Sync {
    /// Unique job name, as recorded in the run manifest.
    fn name(&self) -> &'static str;

    /// Base of the output filenames; may differ from the job name.
    fn dump_name(&self) -> &'static str;

    fn file_type(&self) -> Option<&'static str>;

    fn file_ext(&self) -> &'static str;

    /// One-line human description for status output.
    fn detail(&self) -> String;

    /// Names of jobs that must be `done` before this one runs.
    fn prerequisites(&self) -> &[&'static str];

    fn spec(&self) -> &JobSpec;

    /// The final filenames this job is expected to produce. Checkpointing
    /// jobs cannot know theirs up front and report the non-checkpoint
    /// shape.
    fn list_outfiles(&self, ctx: &JobContext<'_>) -> Result<Vec<DumpFileName>, DumpError> {
        let base = DumpFileName::build(
            ctx.wiki,
            ctx.date,
            self.dump_name(),
            self.file_type(),
            self.file_ext(),
        );
        let mut out = Vec::new();
        for part in self.spec().parts(ctx.config) {
            match part {
                Some(p) => out.push(base.clone().with_part(p).map_err(anyhow::Error::from)?),
                None => out.push(base.clone()),
            }
        }
        Ok(out)
    }

    /// The job body. Writes outputs under `.inprog` names and returns the
    /// final (published) names it produced. In dry-run mode logs the
    /// planned pipelines and returns an empty list.
    async fn run(&self, ctx: &JobContext<'_>) -> Result<Vec<DumpFileName>, DumpError>;
}

/// A job plus its run-scoped status.
pub struct Job {
    inner: Box<dyn DumpJob>,
    status: JobStatus,
    progress: String,
}

impl Job {
    #[must_use]
    pub fn new(inner: Box<dyn DumpJob>) -> Self {
        Self {
            inner,
            status: JobStatus::Waiting,
            progress: String::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Restore a status recorded by an earlier run (manifest resume).
    pub fn set_status(&mut self, status: JobStatus) {
        self.status = status;
    }

    #[must_use]
    pub fn progress(&self) -> &str {
        &self.progress
    }

    #[must_use]
    pub fn inner(&self) -> &dyn DumpJob {
        self.inner.as_ref()
    }

    /// Run the job through its full state machine.
    ///
    /// Prerequisites are checked against `statuses` first: a failed
    /// prerequisite is a hard failure without running; a prerequisite that
    /// has merely not finished leaves this job waiting with
    /// [`DumpError::PrerequisiteNotReady`]. After a successful run every
    /// produced file is integrity-checked and renamed from its `.inprog`
    /// name into place.
    ///
    /// # Errors
    ///
    /// Returns [`DumpError`]; only the `PrerequisiteNotReady` variant
    /// leaves the job waiting.
    pub async fn dump(
        &mut self,
        ctx: &JobContext<'_>,
        statuses: &HashMap<String, JobStatus>,
    ) -> Result<Vec<DumpFileName>, DumpError> {
        for prereq in self.inner.prerequisites() {
            match statuses.get(*prereq).copied() {
                Some(JobStatus::Done) => {}
                Some(JobStatus::Failed) => {
                    self.status = JobStatus::Failed;
                    self.progress = format!("prerequisite {prereq} failed");
                    return Err(DumpError::HardFailure(anyhow!(
                        "prerequisite {prereq} failed, not running {}",
                        self.inner.name()
                    )));
                }
                _ => {
                    return Err(DumpError::PrerequisiteNotReady {
                        job: (*prereq).to_string(),
                    });
                }
            }
        }

        self.status = JobStatus::InProgress;
        self.progress = "running".to_string();

        match self.inner.run(ctx).await {
            Ok(files) => {
                for name in &files {
                    let inprog = ctx.path_of(&name.clone().as_inprog());
                    let final_path = ctx.path_of(name);
                    if let Err(err) = truncation::verify_and_publish(
                        &inprog,
                        &final_path,
                        &name.ext,
                        ctx.config,
                        ctx.runner,
                    )
                    .await
                    {
                        self.status = JobStatus::Failed;
                        self.progress = err.to_string();
                        return Err(err);
                    }
                }
                self.status = JobStatus::Done;
                self.progress = format!("{} file(s) published", files.len());
                Ok(files)
            }
            Err(err) if err.is_soft() => {
                self.status = JobStatus::Waiting;
                self.progress = err.to_string();
                Err(err)
            }
            Err(err) => {
                self.status = JobStatus::Failed;
                self.progress = err.to_string();
                Err(err)
            }
        }
    }
}
