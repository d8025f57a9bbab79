use std::io;

use tracing::debug;

use crate::status::WaitOutcome;
use crate::terminal::{Reaped, Terminal, WaitEvent, WaitTarget};

/// An OS process and the process group it was placed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: libc::pid_t,
    pub pgid: libc::pid_t,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberState {
    Running,
    Stopped,
    /// Reaped with this shell exit code.
    Done(i32),
}

#[derive(Debug)]
struct Member {
    handle: ProcessHandle,
    state: MemberState,
}

/// How a group wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    /// Every member exited; carries the last member's exit code.
    Finished(i32),
    /// Every member that has not exited is stopped.
    Stopped,
}

/// All processes of one pipeline, in pipeline order.
#[derive(Debug)]
pub struct ProcessGroup {
    pgid: libc::pid_t,
    members: Vec<Member>,
}

impl ProcessGroup {
    /// Start a group from its leader.
    pub fn new(leader: ProcessHandle) -> Self {
        Self {
            pgid: leader.pgid,
            members: vec![Member {
                handle: leader,
                state: MemberState::Running,
            }],
        }
    }

    pub fn push(&mut self, handle: ProcessHandle) {
        debug_assert_eq!(handle.pgid, self.pgid);
        self.members.push(Member {
            handle,
            state: MemberState::Running,
        });
    }

    pub fn pgid(&self) -> libc::pid_t {
        self.pgid
    }

    #[cfg(test)]
    pub fn handles(&self) -> impl Iterator<Item = ProcessHandle> + '_ {
        self.members.iter().map(|m| m.handle)
    }

    /// Pid shown in job notices: the last command of the pipeline.
    pub fn last_pid(&self) -> libc::pid_t {
        self.members.last().map_or(self.pgid, |m| m.handle.pid)
    }

    pub fn is_finished(&self) -> bool {
        self.members
            .iter()
            .all(|m| matches!(m.state, MemberState::Done(_)))
    }

    pub fn is_stopped(&self) -> bool {
        self.members.iter().all(|m| m.state != MemberState::Running)
            && self.members.iter().any(|m| m.state == MemberState::Stopped)
    }

    /// Exit code of the last command; 0 if its status was never observed.
    pub fn exit_code(&self) -> i32 {
        match self.members.last().map(|m| m.state) {
            Some(MemberState::Done(code)) => code,
            _ => 0,
        }
    }

    /// Apply a wait report. Returns `false` if `event` is not for a member.
    pub fn record(&mut self, event: WaitEvent) -> bool {
        let Some(member) = self.members.iter_mut().find(|m| m.handle.pid == event.pid) else {
            return false;
        };
        member.state = match event.outcome {
            outcome if outcome.is_stop() => MemberState::Stopped,
            WaitOutcome::Continued => MemberState::Running,
            outcome => MemberState::Done(outcome.exit_code()),
        };
        true
    }

    /// The kernel has no more children in this group; anything unobserved is
    /// treated as exited.
    fn mark_gone(&mut self) {
        for member in &mut self.members {
            if !matches!(member.state, MemberState::Done(_)) {
                member.state = MemberState::Done(0);
            }
        }
    }

    /// Block until the group finishes, or (with `allow_stop`) stops.
    pub fn wait(&mut self, terminal: &Terminal, allow_stop: bool) -> io::Result<GroupStatus> {
        loop {
            if self.is_finished() {
                return Ok(GroupStatus::Finished(self.exit_code()));
            }
            if allow_stop && self.is_stopped() {
                return Ok(GroupStatus::Stopped);
            }
            match terminal.wait(WaitTarget::Group(self.pgid), allow_stop)? {
                Reaped::Event(event) => {
                    self.record(event);
                }
                Reaped::Gone => self.mark_gone(),
                Reaped::Running => {}
            }
        }
    }

    /// Collect every pending state change without blocking, continues
    /// included.
    pub fn poll(&mut self, terminal: &Terminal) -> io::Result<()> {
        while !self.is_finished() {
            match terminal.poll(WaitTarget::Group(self.pgid))? {
                Reaped::Event(event) => {
                    self.record(event);
                }
                Reaped::Running => break,
                Reaped::Gone => self.mark_gone(),
            }
        }
        Ok(())
    }

    /// Send SIGCONT to the whole group and mark stopped members running.
    pub fn resume(&mut self) -> io::Result<()> {
        signal_group(self.pgid, libc::SIGCONT)?;
        for member in &mut self.members {
            if member.state == MemberState::Stopped {
                member.state = MemberState::Running;
            }
        }
        Ok(())
    }

    pub fn signal(&self, signal: libc::c_int) -> io::Result<()> {
        signal_group(self.pgid, signal)
    }
}

pub(crate) fn signal_group(pgid: libc::pid_t, signal: libc::c_int) -> io::Result<()> {
    if pgid <= 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "invalid process group id",
        ));
    }

    debug!(pgid, signal, "signalling process group");
    loop {
        let rc = unsafe { libc::kill(-pgid, signal) };
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
