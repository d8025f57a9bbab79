use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::RawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

use os_pipe::{PipeReader, PipeWriter};
use tracing::debug;

use crate::command::{CommandDescriptor, Input, Output, WriteMode};
use crate::error::ExecError;
use crate::process::ProcessHandle;
use crate::terminal;

/// Process group a new process is placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupTarget {
    /// Become the leader of a new group.
    Lead,
    /// Join an existing group.
    Join(libc::pid_t),
}

/// One pipeline position, ready to launch.
pub struct Launch<'a> {
    pub descriptor: &'a CommandDescriptor,
    pub group: GroupTarget,
    pub stdin_pipe: Option<PipeReader>,
    pub stdout_pipe: Option<PipeWriter>,
    /// Terminal the new group claims for itself when run in the foreground.
    pub foreground_tty: Option<RawFd>,
}

/// Spawn one process for `launch.descriptor`.
///
/// The pipe ends in `launch` are moved into the child and the parent's
/// copies are closed before this returns.
pub fn spawn(launch: Launch<'_>) -> Result<ProcessHandle, ExecError> {
    let Launch {
        descriptor,
        group,
        stdin_pipe,
        stdout_pipe,
        foreground_tty,
    } = launch;

    let mut command = Command::new(descriptor.program());
    command.args(descriptor.args());

    // Fixed order: output file, output pipe, input pipe, input file.
    match (&descriptor.output, stdout_pipe) {
        (Output::File { path, mode }, _) => {
            command.stdout(open_output(path, *mode)?);
        }
        (_, Some(writer)) => {
            command.stdout(writer);
        }
        (_, None) => {}
    }
    match (&descriptor.input, stdin_pipe) {
        (Input::File(path), _) => {
            command.stdin(open_input(path)?);
        }
        (_, Some(reader)) => {
            command.stdin(reader);
        }
        (_, None) => {}
    }

    let pgid_arg = match group {
        GroupTarget::Lead => 0,
        GroupTarget::Join(pgid) => pgid,
    };
    command.process_group(pgid_arg);

    // SAFETY: the hook only makes async-signal-safe libc calls.
    unsafe {
        command.pre_exec(move || {
            // Claim the terminal while SIGTTOU is still ignored.
            if let Some(fd) = foreground_tty {
                libc::tcsetpgrp(fd, libc::getpgrp());
            }
            terminal::reset_child_signals();
            Ok(())
        });
    }

    let child = command.spawn().map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ExecError::NotFound(descriptor.program().to_string())
        } else {
            ExecError::Spawn {
                program: descriptor.program().to_string(),
                source,
            }
        }
    })?;
    // Closes the parent's copies of the child's pipe ends and files.
    drop(command);

    let pid = child.id() as libc::pid_t;
    let pgid = match group {
        GroupTarget::Lead => pid,
        GroupTarget::Join(pgid) => pgid,
    };
    // Same call the child made; whichever runs first wins, both agree.
    if let Err(e) = set_process_group(pid, pgid) {
        debug!(pid, pgid, error = %e, "parent-side setpgid failed");
    }
    debug!(pid, pgid, program = descriptor.program(), "spawned");

    Ok(ProcessHandle { pid, pgid })
}

fn open_output(path: &Path, mode: WriteMode) -> Result<File, ExecError> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).mode(0o644);
    match mode {
        WriteMode::Truncate => options.truncate(true),
        WriteMode::Append => options.append(true),
    };
    options.open(path).map_err(|source| ExecError::Redirect {
        path: path.to_path_buf(),
        source,
    })
}

fn open_input(path: &Path) -> Result<File, ExecError> {
    File::open(path).map_err(|source| ExecError::Redirect {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn set_process_group(pid: libc::pid_t, pgid: libc::pid_t) -> io::Result<()> {
    loop {
        let rc = unsafe { libc::setpgid(pid, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(code) if code == libc::EINTR => continue,
            // Already exec'd or gone; the child's own setpgid covered it.
            Some(code) if code == libc::EACCES || code == libc::ESRCH => return Ok(()),
            _ => return Err(err),
        }
    }
}

#[cfg(test)]
pub(crate) fn process_group_id(pid: libc::pid_t) -> io::Result<libc::pid_t> {
    loop {
        let rc = unsafe { libc::getpgid(pid) };
        if rc >= 0 {
            return Ok(rc);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}
