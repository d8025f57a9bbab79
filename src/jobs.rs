use std::fmt;
use std::io::Write;

use tracing::{debug, warn};

use crate::command::Pipeline;
use crate::error::JobError;
use crate::process::ProcessGroup;
use crate::terminal::Terminal;

/// The lifecycle state of a tracked job. Finished jobs are removed, never kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Running,
    Stopped,
}

/// A backgrounded or stopped pipeline.
#[derive(Debug)]
pub struct Job {
    /// Owned copy of the pipeline, independent of the line it was read from.
    pub pipeline: Pipeline,
    pub group: ProcessGroup,
    pub state: JobState,
}

impl Job {
    pub fn command(&self) -> &str {
        &self.pipeline.text
    }

    pub fn pgid(&self) -> libc::pid_t {
        self.group.pgid()
    }

    /// Pid shown in notices.
    pub fn pid(&self) -> libc::pid_t {
        self.group.last_pid()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Started,
    Stopped,
    Finished(i32),
}

/// A job-state change line as printed to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Notice {
    pub id: usize,
    pub pid: libc::pid_t,
    pub kind: NoticeKind,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            NoticeKind::Started => write!(f, "[{}] {}", self.id, self.pid),
            NoticeKind::Stopped => write!(f, "[{}] {} Stopped", self.id, self.pid),
            NoticeKind::Finished(code) => {
                write!(f, "[{}] {} Finished. Exit code: {}", self.id, self.pid, code)
            }
        }
    }
}

/// The interpreter's job table.
///
/// Ids are 1-based positions: removing a job shifts every later job down by
/// one, so the ids a user sees never have gaps.
#[derive(Debug)]
pub struct JobTable {
    jobs: Vec<Job>,
    capacity: usize,
}

impl Default for JobTable {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl JobTable {
    pub const DEFAULT_CAPACITY: usize = 128;

    pub fn new(capacity: usize) -> Self {
        Self {
            jobs: Vec::new(),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.jobs.len() >= self.capacity
    }

    /// Record a job, keeping an owned copy of `pipeline`. Returns the new id,
    /// or hands `group` back when the table is full.
    pub fn add(
        &mut self,
        group: ProcessGroup,
        pipeline: &Pipeline,
        state: JobState,
    ) -> Result<usize, ProcessGroup> {
        if self.is_full() {
            return Err(group);
        }
        self.jobs.push(Job {
            pipeline: pipeline.clone(),
            group,
            state,
        });
        Ok(self.jobs.len())
    }

    /// Remove job `id`; later jobs move down by one.
    pub fn remove(&mut self, id: usize) -> Option<Job> {
        if id == 0 || id > self.jobs.len() {
            return None;
        }
        Some(self.jobs.remove(id - 1))
    }

    pub fn get(&self, id: usize) -> Option<&Job> {
        id.checked_sub(1).and_then(|i| self.jobs.get(i))
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut Job> {
        id.checked_sub(1).and_then(|i| self.jobs.get_mut(i))
    }

    /// `None` selects the most recently added job; `Some(n)` selects job `n`.
    pub fn resolve(&self, index: Option<usize>) -> Result<usize, JobError> {
        match index {
            None if self.jobs.is_empty() => Err(JobError::NoCurrentJob),
            None => Ok(self.jobs.len()),
            Some(n) if n >= 1 && n <= self.jobs.len() => Ok(n),
            Some(n) => Err(JobError::NoSuchJob(n)),
        }
    }

    /// Jobs with their current ids, oldest first.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Job)> {
        self.jobs.iter().enumerate().map(|(i, job)| (i + 1, job))
    }

    /// Non-blocking check of every job. Prints a notice for each job that
    /// finished (and removes it) or newly stopped.
    pub fn poll(&mut self, terminal: &Terminal, out: &mut dyn Write) {
        let mut index = 0;
        while index < self.jobs.len() {
            let id = index + 1;
            let job = &mut self.jobs[index];
            if let Err(e) = job.group.poll(terminal) {
                warn!(id, pgid = job.pgid(), error = %e, "failed to poll job");
                index += 1;
                continue;
            }

            if job.group.is_finished() {
                let job = self.jobs.remove(index);
                let notice = Notice {
                    id,
                    pid: job.pid(),
                    kind: NoticeKind::Finished(job.group.exit_code()),
                };
                let _ = writeln!(out, "{notice}");
                continue;
            }

            if job.state == JobState::Stopped && !job.group.is_stopped() {
                debug!(id, pgid = job.pgid(), "stopped job was continued elsewhere");
                job.state = JobState::Running;
            } else if job.state == JobState::Running && job.group.is_stopped() {
                job.state = JobState::Stopped;
                let notice = Notice {
                    id,
                    pid: job.pid(),
                    kind: NoticeKind::Stopped,
                };
                let _ = writeln!(out, "{notice}");
            }
            index += 1;
        }
    }
}
