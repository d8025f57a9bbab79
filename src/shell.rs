use std::io::Write;

use crate::command::CommandLine;
use crate::config::Config;
use crate::jobs::JobTable;
use crate::pipeline::{self, Flow};
use crate::terminal::Terminal;

/// Interpreter state for one run. The loop in `main` owns the only instance.
#[derive(Debug)]
pub struct Shell {
    pub terminal: Terminal,
    pub jobs: JobTable,
    /// Status of the last foreground pipeline.
    pub last_status: i32,
}

impl Shell {
    pub fn new(terminal: Terminal, config: &Config) -> Self {
        Self {
            terminal,
            jobs: JobTable::new(config.max_jobs),
            last_status: 0,
        }
    }

    /// Report background jobs that finished or stopped since the last prompt.
    pub fn notify_job_changes(&mut self, stdout: &mut dyn Write) {
        self.jobs.poll(&self.terminal, stdout);
    }

    /// Run one parsed line. Foreground pipelines get the terminal when the
    /// shell is interactive.
    pub fn run_line(
        &mut self,
        line: &CommandLine,
        stdout: &mut dyn Write,
        stderr: &mut dyn Write,
    ) -> Flow {
        pipeline::run_line(self, line, stdout, stderr)
    }
}
