//! Pipeline description types.

/// One argv vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub program: String,
    pub args: Vec<String>,
}

impl Command {
    /// Build a command from a program and its arguments.
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The full argv, program first.
    #[must_use]
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.argv().join(" "))
    }
}

/// An ordered list of commands piped stdout to stdin. The last stage's
/// stdout is captured unless redirected to a file, shell `> file` style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandPipeline {
    pub stages: Vec<Command>,
    pub output_file: Option<std::path::PathBuf>,
}

impl CommandPipeline {
    /// A pipeline from its stages, first producer to last consumer.
    #[must_use]
    pub fn new(stages: Vec<Command>) -> Self {
        Self {
            stages,
            output_file: None,
        }
    }

    /// A single-stage pipeline.
    pub fn single(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            stages: vec![Command::new(program, args)],
            output_file: None,
        }
    }

    /// Redirect the last stage's stdout into a file instead of capturing it.
    #[must_use]
    pub fn to_file(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.output_file = Some(path.into());
        self
    }
}

/// Shell-style rendering (`a b | c d > out`), used by dry-run output.
impl std::fmt::Display for CommandPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.stages.iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join(" | "))?;
        if let Some(path) = &self.output_file {
            write!(f, " > {}", path.display())?;
        }
        Ok(())
    }
}

/// A sequential list of pipelines; the next starts only when the previous
/// finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSeries {
    pub pipelines: Vec<CommandPipeline>,
}

impl CommandSeries {
    /// A series from its pipelines.
    #[must_use]
    pub fn new(pipelines: Vec<CommandPipeline>) -> Self {
        Self { pipelines }
    }

    /// A series of one pipeline.
    #[must_use]
    pub fn of(pipeline: CommandPipeline) -> Self {
        Self {
            pipelines: vec![pipeline],
        }
    }
}

impl std::fmt::Display for CommandSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let rendered: Vec<String> = self.pipelines.iter().map(ToString::to_string).collect();
        f.write_str(&rendered.join("; "))
    }
}
