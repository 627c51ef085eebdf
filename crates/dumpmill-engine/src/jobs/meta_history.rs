//! Full-revision-history XML: the heaviest pass. Parts fan out through the
//! bounded-parallel runner, and checkpoint files split each part further so
//! an interrupted part does not restart from its first page.

use std::sync::Arc;

use async_trait::async_trait;
use dumpmill_exec::{CommandPipeline, CommandSeries, DEFAULT_PROGRESS_PERIOD};
use dumpmill_files::{DumpFileName, FileFilter, Presence};
use dumpmill_types::PageRange;
use tracing::info;

use crate::config::DumpConfig;
use crate::error::DumpError;
use crate::job::{DumpJob, JobContext, JobSpec};
use crate::jobs::articles::{needed_range, text_pass_argv};

pub struct MetaHistoryJob {
    spec: JobSpec,
}

impl MetaHistoryJob {
    #[must_use]
    pub fn new(config: &DumpConfig) -> Self {
        Self {
            spec: JobSpec {
                chunks_enabled: config.parts.enabled,
                checkpoints_enabled: config.checkpoints,
                ..JobSpec::default()
            },
        }
    }

    /// Rerun shape for a single part.
    #[must_use]
    pub fn for_part(config: &DumpConfig, part: u32) -> Self {
        Self {
            spec: JobSpec {
                chunks_enabled: config.parts.enabled,
                checkpoints_enabled: config.checkpoints,
                fixed_part: Some(part),
                ..JobSpec::default()
            },
        }
    }

    /// Rerun shape for one checkpoint file: a single text pass whose output
    /// is exactly that page range, without the checkpointing machinery.
    #[must_use]
    pub fn for_checkpoint(config: &DumpConfig, part: Option<u32>, range: PageRange) -> Self {
        Self {
            spec: JobSpec {
                chunks_enabled: config.parts.enabled,
                fixed_part: part,
                fixed_checkpoint: Some(range),
                ..JobSpec::default()
            },
        }
    }

    /// The single output name of a checkpoint rerun.
    fn checkpoint_outfile(
        &self,
        ctx: &JobContext<'_>,
        range: PageRange,
    ) -> Result<DumpFileName, DumpError> {
        let base = DumpFileName::build(
            ctx.wiki,
            ctx.date,
            self.dump_name(),
            self.file_type(),
            self.file_ext(),
        );
        let base = match self.spec.fixed_part {
            Some(p) => base.with_part(p).map_err(anyhow::Error::from)?,
            None => base,
        };
        Ok(base.with_checkpoint(range))
    }

    /// The checkpoint files the run left under `.inprog` names.
    fn produced_checkpoints(
        &self,
        ctx: &JobContext<'_>,
    ) -> Result<Vec<DumpFileName>, DumpError> {
        let entries = ctx
            .catalog
            .filter(
                ctx.date,
                &FileFilter {
                    dumpname: Some(self.dump_name().to_string()),
                    ext: Some(self.file_ext().to_string()),
                    checkpoint: Presence::Present,
                    temp: Presence::Absent,
                    inprog: Presence::Present,
                    ..FileFilter::default()
                },
            )
            .map_err(anyhow::Error::from)?;
        Ok(entries
            .into_iter()
            .map(|mut f| {
                f.inprog = false;
                f
            })
            .collect())
    }
}

#[async_trait]
impl DumpJob for MetaHistoryJob {
    fn name(&self) -> &'static str {
        "metahistorybz2dump"
    }

    fn dump_name(&self) -> &'static str {
        "pages-meta-history"
    }

    fn file_type(&self) -> Option<&'static str> {
        Some("xml")
    }

    fn file_ext(&self) -> &'static str {
        "bz2"
    }

    fn detail(&self) -> String {
        "every revision of every page with text, bzip2 compressed".to_string()
    }

    fn prerequisites(&self) -> &[&'static str] {
        &["xmlstubsdump"]
    }

    fn spec(&self) -> &JobSpec {
        &self.spec
    }

    fn list_outfiles(&self, ctx: &JobContext<'_>) -> Result<Vec<DumpFileName>, DumpError> {
        if let Some(range) = self.spec.fixed_checkpoint {
            return Ok(vec![self.checkpoint_outfile(ctx, range)?]);
        }
        let base = DumpFileName::build(
            ctx.wiki,
            ctx.date,
            self.dump_name(),
            self.file_type(),
            self.file_ext(),
        );
        let mut out = Vec::new();
        for part in self.spec.parts(ctx.config) {
            match part {
                Some(p) => out.push(base.clone().with_part(p).map_err(anyhow::Error::from)?),
                None => out.push(base.clone()),
            }
        }
        Ok(out)
    }

    async fn run(&self, ctx: &JobContext<'_>) -> Result<Vec<DumpFileName>, DumpError> {
        std::fs::create_dir_all(ctx.date_dir())?;
        let names = self.list_outfiles(ctx)?;

        if let Some(range) = self.spec.fixed_checkpoint {
            let name = self.checkpoint_outfile(ctx, range)?;
            let sources = ctx
                .prefetch
                .find_source(
                    self.name(),
                    self.dump_name(),
                    self.file_type(),
                    self.file_ext(),
                    range,
                    ctx.date,
                )
                .await;
            let argv = text_pass_argv(
                ctx,
                "stub-meta-history",
                self.spec.fixed_part,
                &name,
                sources.as_deref(),
                true,
            )?;
            let series = CommandSeries::of(CommandPipeline::single(&ctx.config.binaries.php, argv));
            if ctx.dry_run {
                info!(series = %series, "dry run");
                return Ok(Vec::new());
            }
            let outcome = ctx.runner.run_series(&series, None).await?;
            if !outcome.success {
                let failure = outcome.failures.first();
                return Err(DumpError::CommandFailed {
                    argv: failure.map(|f| f.argv.clone()).unwrap_or_default(),
                    code: failure.and_then(|f| f.code),
                });
            }
            return Ok(vec![name]);
        }

        let mut series_list = Vec::with_capacity(names.len());
        for (part, name) in self.spec.parts(ctx.config).into_iter().zip(&names) {
            let sources = ctx
                .prefetch
                .find_source(
                    self.name(),
                    self.dump_name(),
                    self.file_type(),
                    self.file_ext(),
                    needed_range(ctx, part),
                    ctx.date,
                )
                .await;
            let mut argv = text_pass_argv(
                ctx,
                "stub-meta-history",
                part,
                name,
                sources.as_deref(),
                true,
            )?;
            if self.spec.checkpoints_enabled {
                // The maintenance script fills in the page range; `%s`
                // placeholders keep the produced names canonical.
                let pattern = name
                    .clone()
                    .with_checkpoint(PageRange { first: 0, last: 0 })
                    .as_inprog()
                    .file_name()
                    .replace("p0p0", "p%sp%s");
                argv.push(format!(
                    "--checkpointfile={}",
                    ctx.date_dir().join(pattern).display()
                ));
            }
            series_list.push(CommandSeries::of(CommandPipeline::single(
                &ctx.config.binaries.php,
                argv,
            )));
        }

        if ctx.dry_run {
            for s in &series_list {
                info!(series = %s, "dry run");
            }
            return Ok(Vec::new());
        }

        let job_name = self.name();
        let progress = Arc::new(move || {
            info!(job = job_name, "still running");
        });
        let outcome = ctx
            .runner
            .run_parallel(
                series_list,
                ctx.config.worker_count,
                None,
                Some(progress),
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

        if self.spec.checkpoints_enabled {
            let checkpoints = self.produced_checkpoints(ctx)?;
            if !checkpoints.is_empty() {
                return Ok(checkpoints);
            }
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dumpmill_exec::PipelineRunner;
    use dumpmill_files::DumpCatalog;
    use dumpmill_types::{DumpDate, WikiId};

    #[test]
    fn test_chunked_outfiles_carry_part_numbers() {
        let mut config = DumpConfig::with_roots("/pub", "/priv");
        config.parts.enabled = true;
        config.parts.page_bands = vec![100, 100, 100];
        let wiki = WikiId::new("enwiki");
        let date = DumpDate::parse("20240101").unwrap();
        let catalog = DumpCatalog::new(&config.public_root, wiki.clone());
        let runner = PipelineRunner::new();
        let prefetch = crate::prefetch::PrefetchResolver::new(&config, &catalog, &runner);
        let ctx = JobContext {
            config: &config,
            wiki: &wiki,
            date: &date,
            catalog: &catalog,
            runner: &runner,
            prefetch: &prefetch,
            dry_run: false,
        };

        let names = MetaHistoryJob::new(&config).list_outfiles(&ctx).unwrap();
        let rendered: Vec<String> = names.iter().map(DumpFileName::file_name).collect();
        assert_eq!(
            rendered,
            vec![
                "enwiki-20240101-pages-meta-history1.xml.bz2",
                "enwiki-20240101-pages-meta-history2.xml.bz2",
                "enwiki-20240101-pages-meta-history3.xml.bz2",
            ]
        );
    }

    #[test]
    fn test_checkpoint_rerun_targets_one_range() {
        let mut config = DumpConfig::with_roots("/pub", "/priv");
        config.parts.enabled = true;
        config.parts.page_bands = vec![100, 100];
        let wiki = WikiId::new("enwiki");
        let date = DumpDate::parse("20240101").unwrap();
        let catalog = DumpCatalog::new(&config.public_root, wiki.clone());
        let runner = PipelineRunner::new();
        let prefetch = crate::prefetch::PrefetchResolver::new(&config, &catalog, &runner);
        let ctx = JobContext {
            config: &config,
            wiki: &wiki,
            date: &date,
            catalog: &catalog,
            runner: &runner,
            prefetch: &prefetch,
            dry_run: false,
        };

        let range = PageRange::new(100, 200).unwrap();
        let job = MetaHistoryJob::for_checkpoint(&config, Some(2), range);
        let names = job.list_outfiles(&ctx).unwrap();
        let rendered: Vec<String> = names.iter().map(DumpFileName::file_name).collect();
        assert_eq!(
            rendered,
            vec!["enwiki-20240101-pages-meta-history2.xml-p100p200.bz2"]
        );
    }
}
