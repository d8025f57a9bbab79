use std::fmt;
use std::path::PathBuf;

/// How an output file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// `>`: create or truncate.
    Truncate,
    /// `>>`: create or append.
    Append,
}

/// Where a command's standard input comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Input {
    #[default]
    Inherit,
    /// `< path`
    File(PathBuf),
    /// Read end of the pipe from the previous command.
    Pipe,
}

/// Where a command's standard output goes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Output {
    #[default]
    Inherit,
    /// `> path` or `>> path`
    File { path: PathBuf, mode: WriteMode },
    /// Write end of the pipe into the next command.
    Pipe,
}

/// One external-program invocation with its redirection intent.
///
/// `argv` is never empty; `argv[0]` is the program name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub argv: Vec<String>,
    pub input: Input,
    pub output: Output,
}

impl CommandDescriptor {
    #[cfg(test)]
    pub fn new(argv: Vec<String>) -> Self {
        Self {
            argv,
            input: Input::Inherit,
            output: Output::Inherit,
        }
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn pipe_in(&self) -> bool {
        self.input == Input::Pipe
    }

    pub fn pipe_out(&self) -> bool {
        self.output == Output::Pipe
    }

    /// `fg` and `bg` are handled by the interpreter, never spawned.
    pub fn is_job_verb(&self) -> bool {
        matches!(self.program(), "fg" | "bg")
    }
}

/// One `|`-chained invocation, plus the source text it was parsed from.
///
/// Every descriptor but the first reads from a pipe; every descriptor but the
/// last writes to one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub text: String,
    pub commands: Vec<CommandDescriptor>,
    pub background: bool,
}

impl Pipeline {
    /// Build a pipeline, marking the pipe ends between adjacent commands.
    pub fn new(text: String, mut commands: Vec<CommandDescriptor>, background: bool) -> Self {
        let last = commands.len().saturating_sub(1);
        for (i, command) in commands.iter_mut().enumerate() {
            if i > 0 {
                command.input = Input::Pipe;
            }
            if i < last {
                command.output = Output::Pipe;
            }
        }
        Self {
            text,
            commands,
            background,
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Controls whether a chained pipeline runs based on the previous exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    /// `;` (or the first entry): run unconditionally.
    Sequence,
    /// `&&`: run only if the previous pipeline succeeded.
    And,
    /// `||`: run only if the previous pipeline failed.
    Or,
}

impl Connector {
    pub fn should_run(self, last_status: i32) -> bool {
        match self {
            Connector::Sequence => true,
            Connector::And => last_status == 0,
            Connector::Or => last_status != 0,
        }
    }
}

/// One pipeline annotated with the connector that gates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainEntry {
    pub connector: Connector,
    pub pipeline: Pipeline,
}

/// A fully parsed input line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandLine {
    pub entries: Vec<ChainEntry>,
}

impl CommandLine {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(words: &[&str]) -> CommandDescriptor {
        CommandDescriptor::new(words.iter().map(|w| w.to_string()).collect())
    }

    #[test]
    fn pipeline_marks_inner_pipe_ends() {
        let pipeline = Pipeline::new(
            "a | b | c".into(),
            vec![cmd(&["a"]), cmd(&["b"]), cmd(&["c"])],
            false,
        );
        let flags: Vec<(bool, bool)> = pipeline
            .commands
            .iter()
            .map(|c| (c.pipe_in(), c.pipe_out()))
            .collect();
        assert_eq!(flags, vec![(false, true), (true, true), (true, false)]);
    }

    #[test]
    fn single_command_has_no_pipes() {
        let pipeline = Pipeline::new("ls".into(), vec![cmd(&["ls"])], false);
        assert!(!pipeline.commands[0].pipe_in());
        assert!(!pipeline.commands[0].pipe_out());
    }

    #[test]
    fn connectors_gate_on_status() {
        assert!(Connector::Sequence.should_run(1));
        assert!(Connector::And.should_run(0));
        assert!(!Connector::And.should_run(2));
        assert!(Connector::Or.should_run(2));
        assert!(!Connector::Or.should_run(0));
    }

    #[test]
    fn job_verbs_are_recognized() {
        assert!(cmd(&["fg", "2"]).is_job_verb());
        assert!(cmd(&["bg"]).is_job_verb());
        assert!(!cmd(&["fgrep"]).is_job_verb());
    }
}
