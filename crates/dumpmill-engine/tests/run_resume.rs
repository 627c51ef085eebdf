//! End-to-end orchestrator runs over a temporary dump tree, with job
//! bodies that shell out through the real pipeline runner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dumpmill_engine::{DumpConfig, DumpError, JobContext, JobSpec, Orchestrator};
use dumpmill_engine::job::DumpJob;
use dumpmill_exec::{Command, CommandPipeline, CommandSeries};
use dumpmill_files::DumpFileName;
use dumpmill_state::RunStore;
use dumpmill_types::{DumpDate, JobStatus, RunStatus, WikiId};
use tempfile::TempDir;

/// A job that produces its output by running a shell pipeline, succeeding
/// or failing according to a shared switch.
struct ShellJob {
    name: &'static str,
    prereqs: &'static [&'static str],
    spec: JobSpec,
    healthy: Arc<AtomicBool>,
}

impl ShellJob {
    fn new(
        name: &'static str,
        prereqs: &'static [&'static str],
        healthy: Arc<AtomicBool>,
    ) -> Box<dyn DumpJob> {
        Box::new(Self {
            name,
            prereqs,
            spec: JobSpec::default(),
            healthy,
        })
    }
}

#[async_trait]
impl DumpJob for ShellJob {
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
        format!("shell fixture {}", self.name)
    }
    fn prerequisites(&self) -> &[&'static str] {
        self.prereqs
    }
    fn spec(&self) -> &JobSpec {
        &self.spec
    }

    async fn run(&self, ctx: &JobContext<'_>) -> Result<Vec<DumpFileName>, DumpError> {
        let name = DumpFileName::build(ctx.wiki, ctx.date, self.name, None, self.file_ext());
        std::fs::create_dir_all(ctx.date_dir())?;
        let out = ctx.date_dir().join(name.clone().as_inprog().file_name());

        let script = if self.healthy.load(Ordering::SeqCst) {
            format!("echo {} output", self.name)
        } else {
            "exit 5".to_string()
        };
        let pipeline =
            CommandPipeline::new(vec![Command::new("sh", ["-c", script.as_str()])]).to_file(&out);
        let outcome = ctx
            .runner
            .run_series(&CommandSeries::of(pipeline), None)
            .await?;
        if !outcome.success {
            let failure = outcome.failures.first();
            return Err(DumpError::CommandFailed {
                argv: failure.map(|f| f.argv.clone()).unwrap_or_default(),
                code: failure.and_then(|f| f.code),
            });
        }
        Ok(vec![name])
    }
}

struct World {
    _dir: TempDir,
    config: DumpConfig,
    wiki: WikiId,
    date: DumpDate,
}

fn world() -> World {
    let dir = TempDir::new().unwrap();
    let config = DumpConfig::with_roots(dir.path().join("public"), dir.path().join("private"));
    World {
        _dir: dir,
        config,
        wiki: WikiId::new("testwiki"),
        date: DumpDate::parse("20240101").unwrap(),
    }
}

fn jobs(a_healthy: &Arc<AtomicBool>) -> Vec<Box<dyn DumpJob>> {
    let always = Arc::new(AtomicBool::new(true));
    vec![
        ShellJob::new("a", &[], a_healthy.clone()),
        ShellJob::new("b", &["a"], always.clone()),
        ShellJob::new("c", &["a"], always),
    ]
}

#[tokio::test]
async fn test_broken_job_then_fixed_rerun_completes_the_chain() {
    let world = world();
    let a_healthy = Arc::new(AtomicBool::new(false));
    let orch = Orchestrator::new(&world.config, world.wiki.clone(), world.date.clone());

    // Pass 1: A fails, B and C wait, failure count is 1.
    let summary = orch.run_jobs(jobs(&a_healthy)).await.unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.waiting, 2);
    assert_eq!(summary.done, 0);

    let store = RunStore::new(world.config.date_dir(&world.wiki, &world.date));
    let manifest = store.load().unwrap().unwrap();
    assert_eq!(manifest.status, RunStatus::Failed);
    assert_eq!(manifest.job("a").unwrap().status, JobStatus::Failed);
    assert_eq!(manifest.job("b").unwrap().status, JobStatus::Waiting);
    assert_eq!(manifest.job("c").unwrap().status, JobStatus::Waiting);
    assert_eq!(manifest.failure_count(), 1);

    // Pass 2: A fixed; everything completes and publishes.
    a_healthy.store(true, Ordering::SeqCst);
    let summary = orch.run_jobs(jobs(&a_healthy)).await.unwrap();
    assert_eq!(summary.done, 3);
    assert_eq!(summary.failed, 0);

    let manifest = store.load().unwrap().unwrap();
    assert_eq!(manifest.status, RunStatus::Done);
    for job in ["a", "b", "c"] {
        assert!(manifest.job_done(job), "{job} should be done");
        let file = world
            .config
            .date_dir(&world.wiki, &world.date)
            .join(format!("testwiki-20240101-{job}.txt"));
        let content = std::fs::read_to_string(&file).unwrap();
        assert_eq!(content, format!("{job} output\n"));
    }
}

#[tokio::test]
async fn test_resumed_run_does_not_redo_done_jobs() {
    let world = world();
    let healthy = Arc::new(AtomicBool::new(true));
    let orch = Orchestrator::new(&world.config, world.wiki.clone(), world.date.clone());
    orch.run_jobs(jobs(&healthy)).await.unwrap();

    // Tamper with a published file; a second pass must not overwrite it.
    let file = world
        .config
        .date_dir(&world.wiki, &world.date)
        .join("testwiki-20240101-a.txt");
    std::fs::write(&file, "operator edit\n").unwrap();

    let summary = orch.run_jobs(jobs(&healthy)).await.unwrap();
    assert_eq!(summary.done, 3);
    assert_eq!(std::fs::read_to_string(&file).unwrap(), "operator edit\n");
}

#[tokio::test]
async fn test_spawned_processes_carry_the_run_marker() {
    let world = world();
    let out = Arc::new(std::sync::Mutex::new(String::new()));

    struct MarkerJob {
        spec: JobSpec,
        out: Arc<std::sync::Mutex<String>>,
    }

    #[async_trait]
    impl DumpJob for MarkerJob {
        fn name(&self) -> &'static str {
            "markerprobe"
        }
        fn dump_name(&self) -> &'static str {
            "markerprobe"
        }
        fn file_type(&self) -> Option<&'static str> {
            None
        }
        fn file_ext(&self) -> &'static str {
            "txt"
        }
        fn detail(&self) -> String {
            "echoes the run marker".to_string()
        }
        fn prerequisites(&self) -> &[&'static str] {
            &[]
        }
        fn spec(&self) -> &JobSpec {
            &self.spec
        }
        async fn run(&self, ctx: &JobContext<'_>) -> Result<Vec<DumpFileName>, DumpError> {
            let captured = ctx
                .runner
                .run_capture(&Command::new("sh", ["-c", "echo marker=$DUMPMILL_RUN"]))
                .await?;
            *self.out.lock().unwrap() = captured;
            Ok(Vec::new())
        }
    }

    let orch = Orchestrator::new(&world.config, world.wiki.clone(), world.date.clone());
    orch.run_jobs(vec![Box::new(MarkerJob {
        spec: JobSpec::default(),
        out: out.clone(),
    })])
    .await
    .unwrap();
    assert_eq!(out.lock().unwrap().trim(), "marker=1");
}
