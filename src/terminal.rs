use std::io;
use std::os::fd::RawFd;

use crossterm::tty::IsTty;
use tracing::{debug, warn};

use crate::error::TerminalError;
use crate::status::WaitOutcome;

/// Signals the interpreter ignores for itself. Children get them back at
/// their default disposition before exec.
const JOB_CONTROL_SIGNALS: [libc::c_int; 4] =
    [libc::SIGQUIT, libc::SIGTSTP, libc::SIGTTIN, libc::SIGTTOU];

/// Signals reset to `SIG_DFL` in every spawned child.
const CHILD_DEFAULT_SIGNALS: [libc::c_int; 6] = [
    libc::SIGINT,
    libc::SIGQUIT,
    libc::SIGTSTP,
    libc::SIGTTIN,
    libc::SIGTTOU,
    libc::SIGPIPE,
];

/// Which children a wait applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    #[cfg(test)]
    Process(libc::pid_t),
    /// Any member of this process group.
    Group(libc::pid_t),
}

impl WaitTarget {
    fn waitpid_arg(self) -> libc::pid_t {
        match self {
            #[cfg(test)]
            WaitTarget::Process(pid) => pid,
            WaitTarget::Group(pgid) => -pgid,
        }
    }
}

/// A state change of one child.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitEvent {
    pub pid: libc::pid_t,
    pub outcome: WaitOutcome,
}

/// Result of one `waitpid` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaped {
    Event(WaitEvent),
    /// Non-blocking poll only: children exist but none changed state.
    Running,
    /// No child matches the target any more (`ECHILD`).
    Gone,
}

/// Single authority over which process group owns the controlling terminal.
///
/// A detached terminal (stdin is not a TTY) skips every ownership transfer;
/// waits and process groups behave the same either way.
#[derive(Debug)]
pub struct Terminal {
    tty_fd: Option<RawFd>,
    shell_pgid: libc::pid_t,
}

impl Terminal {
    /// Set up the interpreter's signal posture and, when stdin is a TTY, put
    /// the interpreter in its own process group in the terminal's foreground.
    pub fn acquire() -> Result<Self, TerminalError> {
        if !io::stdin().is_tty() {
            ignore_job_control_signals()?;
            return Ok(Self::detached());
        }

        let fd = libc::STDIN_FILENO;
        // Started in the background: wait until the user brings us forward.
        loop {
            let owner = unsafe { libc::tcgetpgrp(fd) };
            if owner < 0 {
                return Err(TerminalError::NoTerminal(io::Error::last_os_error()));
            }
            let own = unsafe { libc::getpgrp() };
            if owner == own {
                break;
            }
            unsafe {
                libc::kill(-own, libc::SIGTTIN);
            }
        }

        ignore_job_control_signals()?;

        let pid = unsafe { libc::getpid() };
        if unsafe { libc::getpgrp() } != pid {
            crate::launcher::set_process_group(pid, pid).map_err(TerminalError::Foreground)?;
        }
        let shell_pgid = unsafe { libc::getpgrp() };
        set_terminal_foreground(fd, shell_pgid).map_err(TerminalError::Foreground)?;
        debug!(shell_pgid, "acquired controlling terminal");

        Ok(Self {
            tty_fd: Some(fd),
            shell_pgid,
        })
    }

    /// A terminal arbiter that never transfers ownership.
    pub fn detached() -> Self {
        Self {
            tty_fd: None,
            shell_pgid: unsafe { libc::getpgrp() },
        }
    }

    pub fn is_interactive(&self) -> bool {
        self.tty_fd.is_some()
    }

    pub fn tty_fd(&self) -> Option<RawFd> {
        self.tty_fd
    }

    pub fn shell_pgid(&self) -> libc::pid_t {
        self.shell_pgid
    }

    /// Hand the terminal to `pgid`.
    pub fn give(&self, pgid: libc::pid_t) -> io::Result<()> {
        match self.tty_fd {
            Some(fd) => {
                debug!(pgid, "giving terminal");
                set_terminal_foreground(fd, pgid)
            }
            None => Ok(()),
        }
    }

    /// Take the terminal back for the interpreter's own group.
    pub fn reclaim(&self) -> io::Result<()> {
        match self.tty_fd {
            Some(fd) => {
                debug!(pgid = self.shell_pgid, "reclaiming terminal");
                set_terminal_foreground(fd, self.shell_pgid)
            }
            None => Ok(()),
        }
    }

    /// Give the terminal to `pgid` until the returned guard drops. Transfer
    /// failures are logged and otherwise ignored.
    pub fn foreground(&self, pgid: libc::pid_t) -> ForegroundGuard<'_> {
        if let Err(e) = self.give(pgid) {
            warn!(pgid, error = %e, "failed to give terminal to job");
        }
        ForegroundGuard { terminal: self }
    }

    /// Block until a child matching `target` changes state. Stops are only
    /// reported when `allow_stop` is set.
    pub fn wait(&self, target: WaitTarget, allow_stop: bool) -> io::Result<Reaped> {
        let flags = if allow_stop { libc::WUNTRACED } else { 0 };
        reap(target, flags)
    }

    /// Non-blocking check for a state change, stops and continues included.
    pub fn poll(&self, target: WaitTarget) -> io::Result<Reaped> {
        reap(target, libc::WNOHANG | libc::WUNTRACED | libc::WCONTINUED)
    }
}

/// Returns terminal ownership to the interpreter on drop, error paths included.
pub struct ForegroundGuard<'a> {
    terminal: &'a Terminal,
}

impl Drop for ForegroundGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.terminal.reclaim() {
            warn!(error = %e, "failed to reclaim terminal");
        }
    }
}

fn reap(target: WaitTarget, flags: libc::c_int) -> io::Result<Reaped> {
    let mut raw_status: libc::c_int = 0;

    loop {
        let rc = unsafe { libc::waitpid(target.waitpid_arg(), &mut raw_status, flags) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            match err.raw_os_error() {
                Some(code) if code == libc::EINTR => continue,
                Some(code) if code == libc::ECHILD => return Ok(Reaped::Gone),
                _ => return Err(err),
            }
        }
        if rc == 0 {
            return Ok(Reaped::Running);
        }

        if let Some(outcome) = WaitOutcome::from_raw(raw_status) {
            debug!(pid = rc, ?outcome, "child changed state");
            return Ok(Reaped::Event(WaitEvent { pid: rc, outcome }));
        }
    }
}

fn set_terminal_foreground(fd: RawFd, pgid: libc::pid_t) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    loop {
        let rc = unsafe { libc::tcsetpgrp(fd, pgid) };
        if rc == 0 {
            return Ok(());
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EINTR) {
            continue;
        }
        return Err(err);
    }
}

fn ignore_job_control_signals() -> Result<(), TerminalError> {
    for signal in JOB_CONTROL_SIGNALS {
        let previous = unsafe { libc::signal(signal, libc::SIG_IGN) };
        if previous == libc::SIG_ERR {
            return Err(TerminalError::Signal(io::Error::last_os_error()));
        }
    }
    Ok(())
}

/// Restore default dispositions in a freshly forked child.
///
/// Runs between fork and exec: only async-signal-safe calls.
pub(crate) fn reset_child_signals() {
    for signal in CHILD_DEFAULT_SIGNALS {
        unsafe {
            libc::signal(signal, libc::SIG_DFL);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detached_terminal_skips_transfers() {
        let terminal = Terminal::detached();
        assert!(!terminal.is_interactive());
        assert!(terminal.give(1).is_ok());
        assert!(terminal.reclaim().is_ok());
        drop(terminal.foreground(1));
    }

    #[test]
    fn group_targets_are_negated() {
        assert_eq!(WaitTarget::Group(42).waitpid_arg(), -42);
        assert_eq!(WaitTarget::Process(42).waitpid_arg(), 42);
    }

    #[test]
    fn waiting_on_unknown_child_reports_gone() {
        let terminal = Terminal::detached();
        // pid 1 is never our child.
        assert_eq!(terminal.poll(WaitTarget::Process(1)).unwrap(), Reaped::Gone);
    }

    #[test]
    fn wait_reports_exit_code() {
        let child = std::process::Command::new("sh")
            .args(["-c", "exit 3"])
            .spawn()
            .unwrap();
        let pid = child.id() as libc::pid_t;
        let terminal = Terminal::detached();
        match terminal.wait(WaitTarget::Process(pid), true).unwrap() {
            Reaped::Event(event) => {
                assert_eq!(event.pid, pid);
                assert_eq!(event.outcome, WaitOutcome::Exited(3));
            }
            other => panic!("unexpected wait result: {other:?}"),
        }
    }
}
