//! Pipeline execution: series, bounded-parallel batches, capture.

use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command as OsCommand;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::error::{ExecError, Result};
use crate::pipeline::{Command, CommandPipeline, CommandSeries};

/// Default interval for the parallel-batch progress callback.
pub const DEFAULT_PROGRESS_PERIOD: Duration = Duration::from_millis(5000);

/// Called with each output line as it arrives. Per-series line order is
/// preserved; lines may interleave across concurrent series.
pub type LineCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Called periodically during a parallel batch regardless of command
/// output, so status displays refresh even when a long tool is silent.
pub type ProgressCallback = Arc<dyn Fn() + Send + Sync>;

/// One failed stage, with the offending argv recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFailure {
    pub argv: String,
    pub stage: usize,
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.signal) {
            (Some(code), _) => write!(f, "`{}` exited {code}", self.argv),
            (None, Some(sig)) => write!(f, "`{}` killed by signal {sig}", self.argv),
            (None, None) => write!(f, "`{}` failed", self.argv),
        }
    }
}

/// Result of running one series.
#[derive(Debug, Default)]
pub struct SeriesOutcome {
    pub success: bool,
    /// Captured output; empty when a line callback consumed it instead.
    pub output: String,
    pub failures: Vec<StageFailure>,
}

/// Result of a bounded-parallel batch.
#[derive(Debug, Default)]
pub struct ParallelOutcome {
    pub success: bool,
    pub failures: Vec<StageFailure>,
    pub outputs: Vec<String>,
}

/// Runs pipelines with a fixed environment overlay.
///
/// Every spawned process receives the configured environment variables, in
/// particular the run-marker variable that lets administrative tooling tell
/// our processes apart when scanning the process table.
#[derive(Debug, Clone, Default)]
pub struct PipelineRunner {
    env: Vec<(String, String)>,
    pipestatus: bool,
}

impl PipelineRunner {
    /// A runner with no environment overlay and shell-style (last stage)
    /// failure semantics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an environment variable set on every spawned process.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Report any non-final failing stage too (shell `$PIPESTATUS`
    /// semantics). A non-final stage killed by SIGPIPE is still exempt:
    /// a downstream consumer exiting early is a normal pipeline
    /// interaction, not a command failure.
    #[must_use]
    pub fn with_pipestatus(mut self, enabled: bool) -> Self {
        self.pipestatus = enabled;
        self
    }

    /// Run the pipelines of one series strictly sequentially, stopping at
    /// the first failing pipeline (later pipelines consume earlier output).
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] when a stage cannot be spawned or plumbed;
    /// non-zero exits are reported in the outcome, not as errors.
    pub async fn run_series(
        &self,
        series: &CommandSeries,
        line_cb: Option<LineCallback>,
    ) -> Result<SeriesOutcome> {
        let mut outcome = SeriesOutcome {
            success: true,
            ..SeriesOutcome::default()
        };
        for pipeline in &series.pipelines {
            let (statuses, output) = self.run_pipeline(pipeline, line_cb.clone()).await?;
            outcome.output.push_str(&output);
            let failures = self.evaluate(&statuses);
            if !failures.is_empty() {
                for failure in &failures {
                    tracing::warn!(%failure, "pipeline stage failed");
                }
                outcome.failures.extend(failures);
                outcome.success = false;
                break;
            }
        }
        Ok(outcome)
    }

    /// Run independent series concurrently, at most `worker_count` at a
    /// time. Pipelines within each series stay strictly sequential; no
    /// ordering is guaranteed between series.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError`] on spawn or plumbing failure in any series.
    pub async fn run_parallel(
        &self,
        series_list: Vec<CommandSeries>,
        worker_count: usize,
        line_cb: Option<LineCallback>,
        progress_cb: Option<ProgressCallback>,
        period: Duration,
    ) -> Result<ParallelOutcome> {
        let semaphore = Arc::new(Semaphore::new(worker_count.max(1)));
        let mut join_set: JoinSet<Result<SeriesOutcome>> = JoinSet::new();

        let ticker = progress_cb.map(|cb| {
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(period);
                interval.tick().await;
                loop {
                    interval.tick().await;
                    cb();
                }
            })
        });

        for series in series_list {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| scheduler_error(&e.to_string()))?;
            let runner = self.clone();
            let cb = line_cb.clone();
            join_set.spawn(async move {
                let _permit = permit;
                runner.run_series(&series, cb).await
            });
        }

        let mut failures = Vec::new();
        let mut outputs = Vec::new();
        let mut worker_error = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(outcome)) => {
                    failures.extend(outcome.failures);
                    outputs.push(outcome.output);
                }
                Ok(Err(err)) => {
                    join_set.abort_all();
                    worker_error = Some(err);
                }
                Err(join_err) if join_err.is_cancelled() => {}
                Err(join_err) => {
                    join_set.abort_all();
                    worker_error = Some(scheduler_error(&format!(
                        "series task panicked: {join_err}"
                    )));
                }
            }
        }
        if let Some(ticker) = ticker {
            ticker.abort();
        }
        if let Some(err) = worker_error {
            return Err(err);
        }

        Ok(ParallelOutcome {
            success: failures.is_empty(),
            failures,
            outputs,
        })
    }

    /// Run a single command synchronously and capture its stdout. The
    /// convenience form for short queries (e.g. reading a server name from
    /// a helper script).
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::CaptureFailed`] when the command exits
    /// non-zero, with its stderr attached.
    pub async fn run_capture(&self, command: &Command) -> Result<String> {
        let mut cmd = OsCommand::new(&command.program);
        cmd.args(&command.args).stdin(Stdio::null());
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        let out = cmd.output().await.map_err(|e| ExecError::Spawn {
            argv: command.to_string(),
            source: e,
        })?;
        if !out.status.success() {
            return Err(ExecError::CaptureFailed {
                argv: command.to_string(),
                code: out.status.code(),
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    /// Spawn one pipeline's stages connected stdout to stdin, drain stderr
    /// of every stage (and stdout of the last) as lines, and wait for all
    /// stages.
    async fn run_pipeline(
        &self,
        pipeline: &CommandPipeline,
        line_cb: Option<LineCallback>,
    ) -> Result<(Vec<(String, ExitStatus)>, String)> {
        if pipeline.stages.is_empty() {
            return Err(ExecError::EmptyPipeline);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let mut readers: JoinSet<()> = JoinSet::new();
        let mut children = Vec::with_capacity(pipeline.stages.len());
        let mut prev_stdout: Option<tokio::process::ChildStdout> = None;
        let last = pipeline.stages.len() - 1;

        for (i, stage) in pipeline.stages.iter().enumerate() {
            let mut cmd = OsCommand::new(&stage.program);
            cmd.args(&stage.args);
            for (k, v) in &self.env {
                cmd.env(k, v);
            }
            match prev_stdout.take() {
                Some(upstream) => {
                    let stdio: Stdio = upstream.try_into().map_err(|e| ExecError::Io {
                        argv: stage.to_string(),
                        source: e,
                    })?;
                    cmd.stdin(stdio);
                }
                None => {
                    cmd.stdin(Stdio::null());
                }
            }
            if i == last {
                if let Some(path) = &pipeline.output_file {
                    let file = std::fs::File::create(path).map_err(|e| ExecError::Io {
                        argv: stage.to_string(),
                        source: e,
                    })?;
                    cmd.stdout(Stdio::from(file));
                } else {
                    cmd.stdout(Stdio::piped());
                }
            } else {
                cmd.stdout(Stdio::piped());
            }
            cmd.stderr(Stdio::piped());
            cmd.kill_on_drop(true);

            let mut child = cmd.spawn().map_err(|e| ExecError::Spawn {
                argv: stage.to_string(),
                source: e,
            })?;

            if let Some(stderr) = child.stderr.take() {
                spawn_line_reader(&mut readers, stderr, tx.clone());
            }
            if i == last {
                // With a file redirect there is no last-stage stdout pipe.
                if let Some(stdout) = child.stdout.take() {
                    spawn_line_reader(&mut readers, stdout, tx.clone());
                }
            } else {
                prev_stdout = child.stdout.take();
            }
            children.push((stage.to_string(), child));
        }
        drop(tx);

        // Drain concurrently with waiting so a chatty stage cannot block on
        // a full pipe while we sit in wait().
        let collector = tokio::spawn(async move {
            let mut captured = String::new();
            while let Some(line) = rx.recv().await {
                match &line_cb {
                    Some(cb) => cb(&line),
                    None => {
                        captured.push_str(&line);
                        captured.push('\n');
                    }
                }
            }
            captured
        });

        let mut statuses = Vec::with_capacity(children.len());
        for (argv, mut child) in children {
            let status = child.wait().await.map_err(|e| ExecError::Io {
                argv: argv.clone(),
                source: e,
            })?;
            statuses.push((argv, status));
        }
        while readers.join_next().await.is_some() {}
        let output = collector.await.unwrap_or_default();

        Ok((statuses, output))
    }

    /// Decide which stages count as failures.
    ///
    /// Default semantics: only the final stage's status matters, as a shell
    /// reports `$?`. With pipestatus enabled every stage is consulted, but
    /// a non-final stage terminated by a signal that a downstream stage
    /// closing its input would cause (SIGPIPE) is not a failure.
    fn evaluate(&self, statuses: &[(String, ExitStatus)]) -> Vec<StageFailure> {
        let last = statuses.len().saturating_sub(1);
        let mut failures = Vec::new();
        for (i, (argv, status)) in statuses.iter().enumerate() {
            if status.success() {
                continue;
            }
            let signal = status.signal();
            if i != last {
                if !self.pipestatus {
                    continue;
                }
                if signal == Some(libc::SIGPIPE) {
                    continue;
                }
            }
            failures.push(StageFailure {
                argv: argv.clone(),
                stage: i,
                code: status.code(),
                signal,
            });
        }
        failures
    }
}

fn spawn_line_reader<R>(readers: &mut JoinSet<()>, source: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    readers.spawn(async move {
        let mut lines = BufReader::new(source).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

fn scheduler_error(msg: &str) -> ExecError {
    ExecError::Io {
        argv: "<scheduler>".to_string(),
        source: std::io::Error::new(std::io::ErrorKind::Other, msg.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn sh(script: &str) -> CommandPipeline {
        CommandPipeline::single("sh", ["-c", script])
    }

    // -----------------------------------------------------------------------
    // run_series
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_captures_combined_output() {
        let runner = PipelineRunner::new();
        let series = CommandSeries::of(sh("echo out; echo err >&2"));
        let outcome = runner.run_series(&series, None).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.output.contains("out"));
        assert!(outcome.output.contains("err"));
    }

    #[tokio::test]
    async fn test_two_stage_pipeline_pipes_stdout_to_stdin() {
        let runner = PipelineRunner::new();
        let pipeline = CommandPipeline::new(vec![
            Command::new("sh", ["-c", "printf 'a\\nb\\nc\\n'"]),
            Command::new("head", ["-n", "1"]),
        ]);
        let outcome = runner
            .run_series(&CommandSeries::of(pipeline), None)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.output, "a\n");
    }

    #[tokio::test]
    async fn test_output_file_redirect_writes_the_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = dir.path().join("listing.txt");
        let runner = PipelineRunner::new();
        let pipeline = CommandPipeline::new(vec![
            Command::new("sh", ["-c", "printf 'a\\nb\\nc\\n'"]),
            Command::new("head", ["-n", "2"]),
        ])
        .to_file(&out);
        let outcome = runner
            .run_series(&CommandSeries::of(pipeline), None)
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.output.is_empty());
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "a\nb\n");
    }

    #[tokio::test]
    async fn test_producer_sigpipe_is_not_a_failure() {
        // `head` exits after one line; `yes` dies of SIGPIPE. Normal
        // pipeline interaction, must not be reported.
        for pipestatus in [false, true] {
            let runner = PipelineRunner::new().with_pipestatus(pipestatus);
            let pipeline = CommandPipeline::new(vec![
                Command::new("yes", Vec::<String>::new()),
                Command::new("head", ["-n", "1"]),
            ]);
            let outcome = runner
                .run_series(&CommandSeries::of(pipeline), None)
                .await
                .unwrap();
            assert!(outcome.success, "pipestatus={pipestatus}");
            assert!(outcome.failures.is_empty());
        }
    }

    #[tokio::test]
    async fn test_last_stage_exit_code_is_the_failure() {
        let runner = PipelineRunner::new();
        let outcome = runner
            .run_series(&CommandSeries::of(sh("exit 3")), None)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].code, Some(3));
        assert!(outcome.failures[0].argv.contains("exit 3"));
    }

    #[tokio::test]
    async fn test_non_last_failure_needs_pipestatus_mode() {
        let pipeline = CommandPipeline::new(vec![
            Command::new("sh", ["-c", "exit 2"]),
            Command::new("cat", Vec::<String>::new()),
        ]);

        let plain = PipelineRunner::new();
        let outcome = plain
            .run_series(&CommandSeries::of(pipeline.clone()), None)
            .await
            .unwrap();
        assert!(outcome.success);

        let strict = PipelineRunner::new().with_pipestatus(true);
        let outcome = strict
            .run_series(&CommandSeries::of(pipeline), None)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.failures[0].stage, 0);
        assert_eq!(outcome.failures[0].code, Some(2));
    }

    #[tokio::test]
    async fn test_series_stops_after_first_failing_pipeline() {
        let runner = PipelineRunner::new();
        let series = CommandSeries::new(vec![sh("exit 1"), sh("echo never")]);
        let outcome = runner.run_series(&series, None).await.unwrap();
        assert!(!outcome.success);
        assert!(!outcome.output.contains("never"));
    }

    #[tokio::test]
    async fn test_line_callback_sees_lines_as_they_arrive() {
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb: LineCallback = Arc::new(move |line: &str| {
            sink.lock().unwrap().push(line.to_string());
        });
        let runner = PipelineRunner::new();
        let series = CommandSeries::of(sh("echo one >&2; echo two >&2"));
        let outcome = runner.run_series(&series, Some(cb)).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.output.is_empty());
        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_env_overlay_reaches_spawned_processes() {
        let runner = PipelineRunner::new().with_env("DUMP_RUN_MARKER", "test-run");
        let out = runner
            .run_capture(&Command::new("sh", ["-c", "printf %s \"$DUMP_RUN_MARKER\""]))
            .await
            .unwrap();
        assert_eq!(out, "test-run");
    }

    // -----------------------------------------------------------------------
    // run_parallel
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_parallel_completes_all_and_reports_individual_failures() {
        let runner = PipelineRunner::new();
        let series: Vec<CommandSeries> = vec![
            CommandSeries::of(sh("true")),
            CommandSeries::of(sh("exit 7")),
            CommandSeries::of(sh("true")),
            CommandSeries::of(sh("exit 9")),
            CommandSeries::of(sh("true")),
        ];
        let outcome = runner
            .run_parallel(series, 2, None, None, DEFAULT_PROGRESS_PERIOD)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.outputs.len(), 5);
        let mut codes: Vec<Option<i32>> = outcome.failures.iter().map(|f| f.code).collect();
        codes.sort();
        assert_eq!(codes, vec![Some(7), Some(9)]);
    }

    #[tokio::test]
    async fn test_periodic_callback_fires_without_output() {
        let ticks = Arc::new(Mutex::new(0u32));
        let counter = ticks.clone();
        let cb: ProgressCallback = Arc::new(move || {
            *counter.lock().unwrap() += 1;
        });
        let runner = PipelineRunner::new();
        let series = vec![CommandSeries::of(sh("sleep 0.3"))];
        let outcome = runner
            .run_parallel(series, 1, None, Some(cb), Duration::from_millis(50))
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(*ticks.lock().unwrap() >= 2);
    }

    // -----------------------------------------------------------------------
    // run_capture
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_capture_returns_stdout() {
        let runner = PipelineRunner::new();
        let out = runner
            .run_capture(&Command::new("echo", ["server-7"]))
            .await
            .unwrap();
        assert_eq!(out.trim(), "server-7");
    }

    #[tokio::test]
    async fn test_capture_failure_carries_stderr_and_code() {
        let runner = PipelineRunner::new();
        let err = runner
            .run_capture(&Command::new("sh", ["-c", "echo broken >&2; exit 4"]))
            .await
            .unwrap_err();
        match err {
            ExecError::CaptureFailed { code, stderr, .. } => {
                assert_eq!(code, Some(4));
                assert!(stderr.contains("broken"));
            }
            other => panic!("expected CaptureFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_rejected() {
        let runner = PipelineRunner::new();
        let err = runner
            .run_series(&CommandSeries::of(CommandPipeline::new(vec![])), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::EmptyPipeline));
    }
}
