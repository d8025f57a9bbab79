use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Syntax problems found while turning a raw line into a [`CommandLine`].
///
/// [`CommandLine`]: crate::command::CommandLine
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("syntax error near unexpected token `{0}'")]
    UnexpectedToken(String),
    #[error("syntax error: expected filename after `{0}'")]
    MissingRedirectTarget(String),
    #[error("syntax error: {0} is both redirected and piped")]
    ConflictingRedirect(&'static str),
    #[error("syntax error: expected command after `{0}'")]
    UnexpectedEnd(String),
}

/// Failures while building or waiting on a pipeline. Any of these aborts the
/// rest of the command line.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("pipe: {0}")]
    Pipe(#[source] io::Error),
    #[error("{}: {source}", path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("command not found: {0}")]
    NotFound(String),
    #[error("{program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("wait: {0}")]
    Wait(#[source] io::Error),
}

impl ExecError {
    /// Shell status reported for a line aborted by this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecError::NotFound(_) => 127,
            ExecError::Spawn { .. } => 126,
            _ => 1,
        }
    }
}

/// Job Table lookups and job-control signalling.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("no current job")]
    NoCurrentJob,
    #[error("{0}: no such job")]
    NoSuchJob(usize),
    #[error("{0}: invalid job id")]
    InvalidId(String),
    #[error("out of job slots")]
    OutOfSlots,
    #[error("cannot signal job: {0}")]
    Signal(#[source] io::Error),
    #[error("wait: {0}")]
    Wait(#[source] io::Error),
}

/// Startup failures while taking control of the terminal. These are fatal.
#[derive(Debug, Error)]
pub enum TerminalError {
    #[error("no controlling terminal: {0}")]
    NoTerminal(#[source] io::Error),
    #[error("cannot become terminal foreground group: {0}")]
    Foreground(#[source] io::Error),
    #[error("cannot set signal disposition: {0}")]
    Signal(#[source] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exec_errors_map_to_shell_statuses() {
        assert_eq!(ExecError::NotFound("nope".into()).exit_code(), 127);
        let spawn = ExecError::Spawn {
            program: "x".into(),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        assert_eq!(spawn.exit_code(), 126);
        let redirect = ExecError::Redirect {
            path: PathBuf::from("/missing/file"),
            source: io::Error::from(io::ErrorKind::NotFound),
        };
        assert_eq!(redirect.exit_code(), 1);
        assert!(redirect.to_string().starts_with("/missing/file: "));
    }

    #[test]
    fn job_errors_read_like_shell_messages() {
        assert_eq!(JobError::NoSuchJob(4).to_string(), "4: no such job");
        assert_eq!(JobError::OutOfSlots.to_string(), "out of job slots");
    }
}
