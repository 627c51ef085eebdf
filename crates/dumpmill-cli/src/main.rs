mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use dumpmill_types::{DumpDate, JobStatus, WikiId};

use commands::maintenance::Toggle;

#[derive(Parser)]
#[command(
    name = "dumpmill",
    version,
    about = "XML/SQL dump run orchestration for a wiki farm"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the dumps YAML configuration
    #[arg(long, default_value = "dumpmill.yaml", global = true)]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full job list for one wiki
    Run {
        wiki: String,
        /// Dump date (YYYYMMDD); defaults to today
        #[arg(long)]
        date: Option<DumpDate>,
        /// Print planned pipelines without executing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Re-run a single job, optionally narrowed to one part or checkpoint
    Job {
        wiki: String,
        /// Job name as recorded in the manifest, e.g. "articlesdump"
        job: String,
        /// Dump date (YYYYMMDD); defaults to the newest run on disk
        #[arg(long)]
        date: Option<DumpDate>,
        /// Part number to re-run
        #[arg(long)]
        part: Option<u32>,
        /// Checkpoint range to re-run, e.g. "p100p200"
        #[arg(long)]
        checkpoint: Option<String>,
        /// Print planned pipelines without executing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Mark a job's status by hand in the run manifest
    Status {
        wiki: String,
        /// Job name as recorded in the manifest
        job: String,
        /// New status: waiting, in_progress, done, failed or skipped
        status: JobStatus,
        /// Dump date (YYYYMMDD); defaults to the newest run on disk
        #[arg(long)]
        date: Option<DumpDate>,
    },
    /// Remove a run lock after a staleness check, or unconditionally
    Unlock {
        wiki: String,
        /// Dump date (YYYYMMDD); defaults to the newest run on disk
        #[arg(long)]
        date: Option<DumpDate>,
        /// Skip the staleness check
        #[arg(long)]
        force: bool,
    },
    /// Toggle the marker file that stops runs between jobs
    Maintenance {
        #[arg(value_enum)]
        state: Toggle,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    let config = dumpmill_engine::load_config(&cli.config)?;

    match cli.command {
        Commands::Run { wiki, date, dry_run } => {
            commands::run::execute(&config, WikiId::new(wiki), date, dry_run).await
        }
        Commands::Job {
            wiki,
            job,
            date,
            part,
            checkpoint,
            dry_run,
        } => {
            commands::job::execute(
                &config,
                WikiId::new(wiki),
                &job,
                date,
                part,
                checkpoint,
                dry_run,
            )
            .await
        }
        Commands::Status {
            wiki,
            job,
            status,
            date,
        } => commands::status::execute(&config, &WikiId::new(wiki), &job, status, date),
        Commands::Unlock { wiki, date, force } => {
            commands::unlock::execute(&config, &WikiId::new(wiki), date, force).await
        }
        Commands::Maintenance { state } => commands::maintenance::execute(&config, state),
    }
}
