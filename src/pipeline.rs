use std::io::Write;

use os_pipe::PipeReader;
use tracing::{debug, warn};

use crate::builtins::{self, BuiltinAction};
use crate::command::{CommandDescriptor, CommandLine, Pipeline};
use crate::error::{ExecError, JobError};
use crate::jobs::{JobState, JobTable, Notice, NoticeKind};
use crate::launcher::{self, GroupTarget, Launch};
use crate::process::{GroupStatus, ProcessGroup};
use crate::shell::Shell;
use crate::status;
use crate::terminal::Terminal;

/// What the interpreter loop should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue(i32),
    Exit(i32),
}

/// How one pipeline ended, as far as the current line is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    /// Ran in the foreground to completion with this exit code.
    Completed(i32),
    /// Launched as a background job.
    Background,
    /// Stopped in the foreground and recorded as a job; carries the status
    /// reported for it.
    Stopped(i32),
}

impl PipelineStatus {
    pub fn exit_code(self) -> i32 {
        match self {
            PipelineStatus::Completed(code) | PipelineStatus::Stopped(code) => code,
            PipelineStatus::Background => 0,
        }
    }
}

/// Run every pipeline of a parsed line, honoring `&&`/`||` gating. A stop or
/// a launch failure abandons the rest of the line.
pub fn run_line(
    shell: &mut Shell,
    line: &CommandLine,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Flow {
    let mut last_status = shell.last_status;

    for entry in &line.entries {
        if !entry.connector.should_run(last_status) {
            continue;
        }
        let pipeline = &entry.pipeline;

        if let Some(action) = run_interpreter_builtin(pipeline, stderr) {
            match action {
                BuiltinAction::Continue(code) => {
                    last_status = code;
                    continue;
                }
                BuiltinAction::Exit(code) => {
                    shell.last_status = code;
                    return Flow::Exit(code);
                }
            }
        }

        match run_pipeline(shell, pipeline, stdout, stderr) {
            Ok(status @ PipelineStatus::Stopped(_)) => {
                last_status = status.exit_code();
                break;
            }
            Ok(status) => last_status = status.exit_code(),
            Err(e) => {
                let _ = writeln!(stderr, "jobsh: {e}");
                last_status = e.exit_code();
                break;
            }
        }
    }

    shell.last_status = last_status;
    Flow::Continue(last_status)
}

/// `cd` and `exit` run inside the interpreter when they are the whole
/// foreground pipeline.
fn run_interpreter_builtin(pipeline: &Pipeline, stderr: &mut dyn Write) -> Option<BuiltinAction> {
    match pipeline.commands.as_slice() {
        [only] if !pipeline.background && builtins::is_builtin(only.program()) => {
            Some(builtins::execute(only.program(), only.args(), stderr))
        }
        _ => None,
    }
}

/// Launch one pipeline and either wait for it or record it as a job.
pub fn run_pipeline(
    shell: &mut Shell,
    pipeline: &Pipeline,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<PipelineStatus, ExecError> {
    let mut background = pipeline.background;
    if background && shell.jobs.is_full() {
        let _ = writeln!(stderr, "jobsh: {}; running in foreground", JobError::OutOfSlots);
        background = false;
    }
    let foreground_tty = if background {
        None
    } else {
        shell.terminal.tty_fd()
    };

    let mut group = None;
    let diverted = match launch_processes(pipeline, foreground_tty, &mut group) {
        Ok(diverted) => diverted,
        Err(e) => {
            if let Some(group) = group {
                abort(group, &shell.terminal);
            }
            // A foreground child claims the terminal before exec, even when
            // exec then fails.
            if foreground_tty.is_some() {
                if let Err(err) = shell.terminal.reclaim() {
                    warn!(error = %err, "failed to reclaim terminal after launch failure");
                }
            }
            return Err(e);
        }
    };

    let mut status = match group {
        None => PipelineStatus::Completed(0),
        Some(group) if background => {
            match shell.jobs.add(group, pipeline, JobState::Running) {
                Ok(id) => {
                    if let Some(job) = shell.jobs.get(id) {
                        let notice = Notice {
                            id,
                            pid: job.pid(),
                            kind: NoticeKind::Started,
                        };
                        let _ = writeln!(stdout, "{notice}");
                    }
                    PipelineStatus::Background
                }
                Err(group) => {
                    let _ = writeln!(stderr, "jobsh: {}", JobError::OutOfSlots);
                    wait_foreground(group, pipeline, &shell.terminal, &mut shell.jobs, stdout, stderr)?
                }
            }
        }
        Some(group) => {
            wait_foreground(group, pipeline, &shell.terminal, &mut shell.jobs, stdout, stderr)?
        }
    };

    if let Some(verb) = diverted {
        status = builtins::run_job_verb(
            verb,
            &mut shell.jobs,
            &shell.terminal,
            stdout,
            stderr,
        );
    }
    Ok(status)
}

/// Spawn every process of `pipeline` into one process group, stored in
/// `group` as it grows so the caller can clean up after a failure. Stops at
/// a `fg`/`bg` verb and returns it.
fn launch_processes<'p>(
    pipeline: &'p Pipeline,
    foreground_tty: Option<std::os::fd::RawFd>,
    group: &mut Option<ProcessGroup>,
) -> Result<Option<&'p CommandDescriptor>, ExecError> {
    let mut pending_read: Option<PipeReader> = None;

    for descriptor in &pipeline.commands {
        if descriptor.is_job_verb() {
            return Ok(Some(descriptor));
        }
        if !descriptor.pipe_in() {
            pending_read = None;
        }

        let (next_read, stdout_pipe) = if descriptor.pipe_out() {
            let (reader, writer) = os_pipe::pipe().map_err(ExecError::Pipe)?;
            (Some(reader), Some(writer))
        } else {
            (None, None)
        };

        let target = group
            .as_ref()
            .map_or(GroupTarget::Lead, |group| GroupTarget::Join(group.pgid()));
        let handle = launcher::spawn(Launch {
            descriptor,
            group: target,
            stdin_pipe: pending_read.take(),
            stdout_pipe,
            foreground_tty,
        })?;

        if let Some(existing) = group.as_mut() {
            existing.push(handle);
        } else {
            *group = Some(ProcessGroup::new(handle));
        }
        pending_read = next_read;
    }

    Ok(None)
}

/// Hand the terminal to `group`, wait for it, and take the terminal back.
/// A stopped group becomes a job.
fn wait_foreground(
    mut group: ProcessGroup,
    pipeline: &Pipeline,
    terminal: &Terminal,
    jobs: &mut JobTable,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<PipelineStatus, ExecError> {
    loop {
        let outcome = {
            let _foreground = terminal.foreground(group.pgid());
            group.wait(terminal, true)
        }
        .map_err(ExecError::Wait)?;

        match outcome {
            GroupStatus::Finished(code) => {
                debug!(pgid = group.pgid(), code, "foreground pipeline finished");
                return Ok(PipelineStatus::Completed(code));
            }
            GroupStatus::Stopped => match jobs.add(group, pipeline, JobState::Stopped) {
                Ok(id) => {
                    if let Some(job) = jobs.get(id) {
                        let notice = Notice {
                            id,
                            pid: job.pid(),
                            kind: NoticeKind::Stopped,
                        };
                        let _ = writeln!(stdout, "{notice}");
                    }
                    return Ok(PipelineStatus::Stopped(status::signal_exit_code(
                        libc::SIGTSTP,
                    )));
                }
                Err(returned) => {
                    // Nowhere to park it: let it run on in the foreground.
                    let _ = writeln!(stderr, "jobsh: {}", JobError::OutOfSlots);
                    group = returned;
                    group.resume().map_err(ExecError::Wait)?;
                }
            },
        }
    }
}

/// Tear down a partially launched pipeline. Members get SIGKILL, so none
/// can outlive the abort.
fn abort(mut group: ProcessGroup, terminal: &Terminal) {
    debug!(pgid = group.pgid(), "aborting partially launched pipeline");
    let _ = group.signal(libc::SIGKILL);
    let _ = group.wait(terminal, false);
}
