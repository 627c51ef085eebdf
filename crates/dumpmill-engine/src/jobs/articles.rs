//! Current-revision article XML: a text pass over the stubs, reusing page
//! text from a prior run when the prefetch resolver finds one.

use async_trait::async_trait;
use dumpmill_exec::{CommandPipeline, CommandSeries};
use dumpmill_files::DumpFileName;
use dumpmill_types::PageRange;
use tracing::info;

use crate::config::DumpConfig;
use crate::error::DumpError;
use crate::job::{DumpJob, JobContext, JobSpec};

pub struct ArticlesJob {
    spec: JobSpec,
}

impl ArticlesJob {
    #[must_use]
    pub fn new(config: &DumpConfig) -> Self {
        Self {
            spec: JobSpec {
                chunks_enabled: config.parts.enabled,
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
                fixed_part: Some(part),
                ..JobSpec::default()
            },
        }
    }
}

/// Shared by the articles and full-history jobs: the text-pass command
/// over one stub file, with an optional prefetch source list.
pub(crate) fn text_pass_argv(
    ctx: &JobContext<'_>,
    stub_dumpname: &str,
    part: Option<u32>,
    out_name: &DumpFileName,
    prefetch: Option<&[std::path::PathBuf]>,
    full_history: bool,
) -> Result<Vec<String>, DumpError> {
    let stub = {
        let base = DumpFileName::build(ctx.wiki, ctx.date, stub_dumpname, Some("xml"), "gz");
        match part {
            Some(p) => base.with_part(p).map_err(anyhow::Error::from)?,
            None => base,
        }
    };
    let script = ctx.config.maintenance_script("dumpTextPass.php");

    let mut argv = vec![
        script.display().to_string(),
        format!("--wiki={}", ctx.wiki),
        format!("--stub=gzip:{}", ctx.path_of(&stub).display()),
        "--report=1000".to_string(),
        "--spawn".to_string(),
    ];
    if full_history {
        argv.push("--full".to_string());
    }
    if let Some(sources) = prefetch {
        let joined: Vec<String> = sources.iter().map(|p| p.display().to_string()).collect();
        argv.push(format!("--prefetch=bzip2:{}", joined.join(";")));
    }
    argv.push(format!(
        "--output=bzip2:{}",
        ctx.path_of(&out_name.clone().as_inprog()).display()
    ));
    Ok(argv)
}

/// The page range a part covers, closed at `u64::MAX` for the final part
/// and for whole-job passes.
pub(crate) fn needed_range(ctx: &JobContext<'_>, part: Option<u32>) -> PageRange {
    part.and_then(|p| ctx.config.parts.range_of(p)).unwrap_or(PageRange {
        first: 1,
        last: u64::MAX,
    })
}

#[async_trait]
impl DumpJob for ArticlesJob {
    fn name(&self) -> &'static str {
        "articlesdump"
    }

    fn dump_name(&self) -> &'static str {
        "pages-articles"
    }

    fn file_type(&self) -> Option<&'static str> {
        Some("xml")
    }

    fn file_ext(&self) -> &'static str {
        "bz2"
    }

    fn detail(&self) -> String {
        "current article revisions with text, bzip2 compressed".to_string()
    }

    fn prerequisites(&self) -> &[&'static str] {
        &["xmlstubsdump"]
    }

    fn spec(&self) -> &JobSpec {
        &self.spec
    }

    async fn run(&self, ctx: &JobContext<'_>) -> Result<Vec<DumpFileName>, DumpError> {
        std::fs::create_dir_all(ctx.date_dir())?;
        let names = self.list_outfiles(ctx)?;

        let mut pipelines = Vec::with_capacity(names.len());
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
            let argv = text_pass_argv(
                ctx,
                "stub-articles",
                part,
                name,
                sources.as_deref(),
                false,
            )?;
            pipelines.push(CommandPipeline::single(&ctx.config.binaries.php, argv));
        }

        if ctx.dry_run {
            for p in &pipelines {
                info!(pipeline = %p, "dry run");
            }
            return Ok(Vec::new());
        }

        let outcome = ctx
            .runner
            .run_series(&CommandSeries::new(pipelines), None)
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
