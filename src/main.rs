#[cfg(not(unix))]
compile_error!("jobsh relies on POSIX process groups and terminal control");

mod builtins;
mod command;
mod config;
mod error;
mod jobs;
mod launcher;
mod parser;
mod pipeline;
mod process;
mod reader;
mod shell;
mod status;
mod terminal;

use std::io::{self, Write};

use anyhow::Context;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::pipeline::Flow;
use crate::reader::LineReader;
use crate::shell::Shell;
use crate::terminal::Terminal;

/// Status reported for a line that failed to parse.
const SYNTAX_ERROR_STATUS: i32 = 2;

fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    init_logging(&config);

    let mut reader = LineReader::new();
    if reader.is_interactive() {
        // The interpreter stays alive on Ctrl-C; children get SIGINT back in pre_exec.
        if let Err(e) = ctrlc::set_handler(|| {
            println!();
            let _ = io::stdout().flush();
        }) {
            warn!(error = %e, "failed to install Ctrl-C handler");
        }
    }

    let terminal = Terminal::acquire().context("failed to take control of the terminal")?;
    let mut shell = Shell::new(terminal, &config);
    debug!(
        interactive = shell.terminal.is_interactive(),
        shell_pgid = shell.terminal.shell_pgid(),
        max_jobs = config.max_jobs,
        "jobsh started"
    );

    let status = run(&mut shell, &mut reader, &config.prompt);
    if !shell.jobs.is_empty() {
        debug!(remaining = shell.jobs.len(), "exiting with live jobs");
    }
    std::process::exit(status);
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_filter)
        .unwrap_or_else(|_| EnvFilter::new(config::DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Prompt, read, parse, run, until end of input or `exit`.
fn run(shell: &mut Shell, reader: &mut LineReader, prompt: &str) -> i32 {
    let mut stdout = io::stdout();
    let mut stderr = io::stderr();

    loop {
        shell.notify_job_changes(&mut stdout);

        let input = match reader.read_line(prompt) {
            Ok(Some(input)) => input,
            Ok(None) => break,
            Err(e) => {
                let _ = writeln!(stderr, "jobsh: error reading input: {e}");
                break;
            }
        };
        let line = match parser::parse_line(&input) {
            Ok(line) => line,
            Err(e) => {
                let _ = writeln!(stderr, "jobsh: {e}");
                shell.last_status = SYNTAX_ERROR_STATUS;
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        match shell.run_line(&line, &mut stdout, &mut stderr) {
            Flow::Continue(_) => {}
            Flow::Exit(code) => return code,
        }
        let _ = stdout.flush();
    }

    shell.last_status
}
