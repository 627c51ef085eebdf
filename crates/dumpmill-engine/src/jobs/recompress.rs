//! Recompression of the full-history bz2 output to 7z, which trades dump
//! time for a much smaller long-term archive.

use async_trait::async_trait;
use dumpmill_exec::{Command, CommandPipeline, CommandSeries, DEFAULT_PROGRESS_PERIOD};
use dumpmill_files::{DumpFileName, FileFilter, Presence};
use tracing::info;

use crate::error::DumpError;
use crate::job::{DumpJob, JobContext, JobSpec};

pub struct RecompressJob {
    spec: JobSpec,
}

impl RecompressJob {
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: JobSpec::default(),
        }
    }

    /// The bz2 history files present in this run, parts and checkpoints
    /// alike. These are the recompression inputs.
    fn inputs(&self, ctx: &JobContext<'_>) -> Result<Vec<DumpFileName>, DumpError> {
        let files = ctx
            .catalog
            .filter(
                ctx.date,
                &FileFilter {
                    dumpname: Some(self.dump_name().to_string()),
                    ext: Some("bz2".to_string()),
                    temp: Presence::Absent,
                    inprog: Presence::Absent,
                    ..FileFilter::default()
                },
            )
            .map_err(anyhow::Error::from)?;
        Ok(files)
    }
}

impl Default for RecompressJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DumpJob for RecompressJob {
    fn name(&self) -> &'static str {
        "metahistory7zdump"
    }

    fn dump_name(&self) -> &'static str {
        "pages-meta-history"
    }

    fn file_type(&self) -> Option<&'static str> {
        Some("xml")
    }

    fn file_ext(&self) -> &'static str {
        "7z"
    }

    fn detail(&self) -> String {
        "full-history output recompressed from bz2 to 7z".to_string()
    }

    fn prerequisites(&self) -> &[&'static str] {
        &["metahistorybz2dump"]
    }

    fn spec(&self) -> &JobSpec {
        &self.spec
    }

    fn list_outfiles(&self, ctx: &JobContext<'_>) -> Result<Vec<DumpFileName>, DumpError> {
        Ok(self
            .inputs(ctx)?
            .into_iter()
            .map(|mut name| {
                name.ext = "7z".to_string();
                name
            })
            .collect())
    }

    async fn run(&self, ctx: &JobContext<'_>) -> Result<Vec<DumpFileName>, DumpError> {
        let inputs = self.inputs(ctx)?;
        if inputs.is_empty() {
            return Err(DumpError::HardFailure(anyhow::anyhow!(
                "no {} bz2 files to recompress",
                self.dump_name()
            )));
        }

        let mut names = Vec::with_capacity(inputs.len());
        let mut series_list = Vec::with_capacity(inputs.len());
        for input in inputs {
            let mut out = input.clone();
            out.ext = "7z".to_string();
            let pipeline = CommandPipeline::new(vec![
                Command::new(
                    &ctx.config.binaries.bzip2,
                    ["-dc".to_string(), ctx.path_of(&input).display().to_string()],
                ),
                Command::new(
                    &ctx.config.binaries.sevenzip,
                    [
                        "a".to_string(),
                        "-mx=4".to_string(),
                        "-si".to_string(),
                        ctx.path_of(&out.clone().as_inprog()).display().to_string(),
                    ],
                ),
            ]);
            series_list.push(CommandSeries::of(pipeline));
            names.push(out);
        }

        if ctx.dry_run {
            for s in &series_list {
                info!(series = %s, "dry run");
            }
            return Ok(Vec::new());
        }

        let outcome = ctx
            .runner
            .run_parallel(
                series_list,
                ctx.config.worker_count,
                None,
                None,
                DEFAULT_PROGRESS_PERIOD,
            )
            .await?;
        if !outcome.success {
            let failure = outcome.failures.first();
            return Err(DumpError::CommandFailed {
                argv: failure.map(|f| f.argv.clone()).unwrap_or_default(),
                code: failure.and_then(|f| f.code),
            });
        }
        Ok(names)
    }
}
