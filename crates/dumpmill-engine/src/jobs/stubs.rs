//! XML stub generation: one PHP maintenance pass that writes the history,
//! current, and articles stub files together.

use async_trait::async_trait;
use dumpmill_exec::{CommandPipeline, CommandSeries};
use dumpmill_files::DumpFileName;
use tracing::info;

use crate::config::DumpConfig;
use crate::error::DumpError;
use crate::job::{DumpJob, JobContext, JobSpec};

pub const STUB_DUMPNAMES: [&str; 3] = ["stub-meta-history", "stub-meta-current", "stub-articles"];

pub struct StubsJob {
    spec: JobSpec,
}

impl StubsJob {
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

    fn stub_names(
        &self,
        ctx: &JobContext<'_>,
        part: Option<u32>,
    ) -> Result<Vec<DumpFileName>, DumpError> {
        STUB_DUMPNAMES
            .iter()
            .map(|dumpname| {
                let base = DumpFileName::build(
                    ctx.wiki,
                    ctx.date,
                    *dumpname,
                    self.file_type(),
                    self.file_ext(),
                );
                match part {
                    Some(p) => base.with_part(p).map_err(|e| anyhow::Error::from(e).into()),
                    None => Ok(base),
                }
            })
            .collect()
    }
}

#[async_trait]
impl DumpJob for StubsJob {
    fn name(&self) -> &'static str {
        "xmlstubsdump"
    }

    fn dump_name(&self) -> &'static str {
        "stub-meta-history"
    }

    fn file_type(&self) -> Option<&'static str> {
        Some("xml")
    }

    fn file_ext(&self) -> &'static str {
        "gz"
    }

    fn detail(&self) -> String {
        "first-pass XML stubs: page and revision metadata without text".to_string()
    }

    fn prerequisites(&self) -> &[&'static str] {
        &[]
    }

    fn spec(&self) -> &JobSpec {
        &self.spec
    }

    fn list_outfiles(&self, ctx: &JobContext<'_>) -> Result<Vec<DumpFileName>, DumpError> {
        let mut out = Vec::new();
        for part in self.spec.parts(ctx.config) {
            out.extend(self.stub_names(ctx, part)?);
        }
        Ok(out)
    }

    async fn run(&self, ctx: &JobContext<'_>) -> Result<Vec<DumpFileName>, DumpError> {
        std::fs::create_dir_all(ctx.date_dir())?;
        let script = ctx.config.maintenance_script("dumpBackup.php");

        let mut produced = Vec::new();
        let mut pipelines = Vec::new();
        for part in self.spec.parts(ctx.config) {
            let names = self.stub_names(ctx, part)?;
            let [history, current, articles] = &names[..] else {
                unreachable!("three stub outputs");
            };

            let mut argv: Vec<String> = vec![
                script.display().to_string(),
                format!("--wiki={}", ctx.wiki),
                "--full".to_string(),
                "--stub".to_string(),
                "--report=10000".to_string(),
                format!(
                    "--output=gzip:{}",
                    ctx.path_of(&history.clone().as_inprog()).display()
                ),
                "--filter=latest".to_string(),
                format!(
                    "--output=gzip:{}",
                    ctx.path_of(&current.clone().as_inprog()).display()
                ),
                "--filter=latest".to_string(),
                "--filter=notalk".to_string(),
                "--filter=namespace:!NS_USER".to_string(),
                format!(
                    "--output=gzip:{}",
                    ctx.path_of(&articles.clone().as_inprog()).display()
                ),
            ];
            if let Some(p) = part {
                if let Some((_, first, last)) = ctx
                    .config
                    .parts
                    .part_ranges()
                    .into_iter()
                    .find(|(n, _, _)| *n == p)
                {
                    argv.push(format!("--start={first}"));
                    if let Some(last) = last {
                        // --end is exclusive in the maintenance script.
                        argv.push(format!("--end={}", last + 1));
                    }
                }
            }

            pipelines.push(CommandPipeline::single(&ctx.config.binaries.php, argv));
            produced.extend(names);
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
        Ok(produced)
    }
}
