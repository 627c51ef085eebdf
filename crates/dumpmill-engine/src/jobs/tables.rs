//! SQL table exports: one `mysqldump | gzip` pipeline per configured table.

use async_trait::async_trait;
use dumpmill_exec::{Command, CommandPipeline, CommandSeries};
use dumpmill_files::DumpFileName;
use tracing::info;

use crate::error::DumpError;
use crate::job::{DumpJob, JobContext, JobSpec};

pub struct TablesJob {
    spec: JobSpec,
}

impl TablesJob {
    #[must_use]
    pub fn new() -> Self {
        Self {
            spec: JobSpec::default(),
        }
    }
}

impl Default for TablesJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DumpJob for TablesJob {
    fn name(&self) -> &'static str {
        "tablesdump"
    }

    fn dump_name(&self) -> &'static str {
        "tables"
    }

    fn file_type(&self) -> Option<&'static str> {
        Some("sql")
    }

    fn file_ext(&self) -> &'static str {
        "gz"
    }

    fn detail(&self) -> String {
        "SQL table exports, one gzipped file per table".to_string()
    }

    fn prerequisites(&self) -> &[&'static str] {
        &[]
    }

    fn spec(&self) -> &JobSpec {
        &self.spec
    }

    fn list_outfiles(&self, ctx: &JobContext<'_>) -> Result<Vec<DumpFileName>, DumpError> {
        Ok(ctx
            .config
            .database
            .tables
            .iter()
            .map(|table| {
                DumpFileName::build(ctx.wiki, ctx.date, table, self.file_type(), self.file_ext())
            })
            .collect())
    }

    async fn run(&self, ctx: &JobContext<'_>) -> Result<Vec<DumpFileName>, DumpError> {
        let names = self.list_outfiles(ctx)?;
        std::fs::create_dir_all(ctx.date_dir())?;

        let mut pipelines = Vec::with_capacity(names.len());
        for (table, name) in ctx.config.database.tables.iter().zip(&names) {
            let db = ctx.config.db_name(ctx.wiki);
            let mut argv: Vec<String> = Vec::new();
            if let Some(creds) = &ctx.config.database.credentials_file {
                argv.push(format!("--defaults-extra-file={}", creds.display()));
            }
            if !ctx.config.database.server.is_empty() {
                argv.push("-h".to_string());
                argv.push(ctx.config.database.server.clone());
            }
            argv.push(db.to_string());
            argv.push(table.clone());

            let pipeline = CommandPipeline::new(vec![
                Command::new(&ctx.config.binaries.mysqldump, argv),
                Command::new(&ctx.config.binaries.gzip, Vec::<String>::new()),
            ])
            .to_file(ctx.path_of(&name.clone().as_inprog()));
            pipelines.push(pipeline);
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
