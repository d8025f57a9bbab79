use std::io::Write;

use crate::command::CommandDescriptor;
use crate::error::JobError;
use crate::jobs::{JobState, JobTable, Notice, NoticeKind};
use crate::pipeline::PipelineStatus;
use crate::process::GroupStatus;
use crate::status;
use crate::terminal::Terminal;

/// Commands that run inside the interpreter instead of being spawned.
const BUILTINS: &[&str] = &["cd", "exit"];

#[derive(Debug, PartialEq, Eq)]
pub enum BuiltinAction {
    Continue(i32),
    Exit(i32),
}

/// Returns true if the command name is an in-process builtin.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Execute an in-process builtin, reporting problems on `stderr`.
pub fn execute(program: &str, args: &[String], stderr: &mut dyn Write) -> BuiltinAction {
    match program {
        "cd" => BuiltinAction::Continue(builtin_cd(args, stderr)),
        "exit" => builtin_exit(args, stderr),
        _ => {
            let _ = writeln!(stderr, "jobsh: unknown builtin: {program}");
            BuiltinAction::Continue(1)
        }
    }
}

fn builtin_cd(args: &[String], stderr: &mut dyn Write) -> i32 {
    let target = match args.first() {
        Some(dir) => dir.clone(),
        None => match std::env::var("HOME") {
            Ok(home) => home,
            Err(_) => {
                let _ = writeln!(stderr, "cd: HOME not set");
                return 1;
            }
        },
    };

    if let Err(e) = std::env::set_current_dir(&target) {
        let _ = writeln!(stderr, "cd: {target}: {e}");
        return 1;
    }
    0
}

fn builtin_exit(args: &[String], stderr: &mut dyn Write) -> BuiltinAction {
    match args.first() {
        None => BuiltinAction::Exit(0),
        Some(s) => match s.parse::<i32>() {
            Ok(code) => BuiltinAction::Exit(code),
            Err(_) => {
                let _ = writeln!(stderr, "exit: {s}: numeric argument required");
                BuiltinAction::Exit(2)
            }
        },
    }
}

// ── Job control verbs ──

/// Run a `fg` or `bg` descriptor diverted out of a pipeline.
pub fn run_job_verb(
    verb: &CommandDescriptor,
    jobs: &mut JobTable,
    terminal: &Terminal,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> PipelineStatus {
    let name = verb.program();
    let result = parse_job_index(verb.args().first()).and_then(|index| match name {
        "fg" => builtin_fg(index, jobs, terminal, stdout),
        _ => builtin_bg(index, jobs, stdout).map(PipelineStatus::Completed),
    });

    result.unwrap_or_else(|e| {
        let _ = writeln!(stderr, "{name}: {e}");
        PipelineStatus::Completed(1)
    })
}

/// Continue a job with the terminal handed to it and wait for it.
fn builtin_fg(
    index: Option<usize>,
    jobs: &mut JobTable,
    terminal: &Terminal,
    stdout: &mut dyn Write,
) -> Result<PipelineStatus, JobError> {
    let id = jobs.resolve(index)?;
    let job = jobs.get_mut(id).ok_or(JobError::NoSuchJob(id))?;
    let _ = writeln!(stdout, "{}", job.command());

    let outcome = {
        let _foreground = terminal.foreground(job.pgid());
        job.group.resume().map_err(JobError::Signal)?;
        job.state = JobState::Running;
        job.group.wait(terminal, true).map_err(JobError::Wait)?
    };

    match outcome {
        GroupStatus::Stopped => {
            job.state = JobState::Stopped;
            let notice = Notice {
                id,
                pid: job.pid(),
                kind: NoticeKind::Stopped,
            };
            let _ = writeln!(stdout, "{notice}");
            Ok(PipelineStatus::Stopped(status::signal_exit_code(libc::SIGTSTP)))
        }
        GroupStatus::Finished(code) => {
            let notice = Notice {
                id,
                pid: job.pid(),
                kind: NoticeKind::Finished(code),
            };
            jobs.remove(id);
            let _ = writeln!(stdout, "{notice}");
            Ok(PipelineStatus::Completed(code))
        }
    }
}

/// Continue a job without waiting; it keeps running in the background.
fn builtin_bg(
    index: Option<usize>,
    jobs: &mut JobTable,
    stdout: &mut dyn Write,
) -> Result<i32, JobError> {
    let id = jobs.resolve(index)?;
    let job = jobs.get_mut(id).ok_or(JobError::NoSuchJob(id))?;
    job.group.resume().map_err(JobError::Signal)?;
    job.state = JobState::Running;
    let _ = writeln!(stdout, "[{id}] {} &", job.command());
    Ok(0)
}

/// Parse a job argument (`N` or `%N`); no argument means the current job.
fn parse_job_index(arg: Option<&String>) -> Result<Option<usize>, JobError> {
    match arg {
        None => Ok(None),
        Some(s) => s
            .trim_start_matches('%')
            .parse::<usize>()
            .map(Some)
            .map_err(|_| JobError::InvalidId(s.clone())),
    }
}
