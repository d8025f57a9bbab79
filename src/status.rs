/// Status a shell reports for a process killed by signal `signal`.
pub fn signal_exit_code(signal: libc::c_int) -> i32 {
    128 + signal
}

/// What `waitpid` reported for one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Exited normally with this code.
    Exited(i32),
    /// Terminated by this signal.
    Signaled(libc::c_int),
    /// Stopped by this job-control signal.
    Stopped(libc::c_int),
    /// Resumed by SIGCONT. Only reported when waiting with `WCONTINUED`.
    Continued,
}

impl WaitOutcome {
    /// Decode a raw `waitpid` status. Returns `None` for anything else.
    #[allow(unused_unsafe)]
    pub fn from_raw(raw_status: libc::c_int) -> Option<Self> {
        if unsafe { libc::WIFEXITED(raw_status) } {
            return Some(WaitOutcome::Exited(unsafe { libc::WEXITSTATUS(raw_status) }));
        }
        if unsafe { libc::WIFSIGNALED(raw_status) } {
            return Some(WaitOutcome::Signaled(unsafe { libc::WTERMSIG(raw_status) }));
        }
        if unsafe { libc::WIFSTOPPED(raw_status) } {
            return Some(WaitOutcome::Stopped(unsafe { libc::WSTOPSIG(raw_status) }));
        }
        if unsafe { libc::WIFCONTINUED(raw_status) } {
            return Some(WaitOutcome::Continued);
        }
        None
    }

    /// Shell-style exit code: the exit status, or 128+N for signal N.
    /// A continue carries no status and reads as 0.
    pub fn exit_code(self) -> i32 {
        match self {
            WaitOutcome::Exited(code) => code,
            WaitOutcome::Continued => 0,
            WaitOutcome::Signaled(signal) | WaitOutcome::Stopped(signal) => {
                signal_exit_code(signal)
            }
        }
    }

    pub fn is_stop(self) -> bool {
        matches!(self, WaitOutcome::Stopped(_))
    }
}
