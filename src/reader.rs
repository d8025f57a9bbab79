use std::io::{self, BufRead, Write};

use crossterm::tty::IsTty;

/// Reads one command line per prompt from stdin.
pub struct LineReader {
    stdin: io::Stdin,
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

impl LineReader {
    pub fn new() -> Self {
        Self { stdin: io::stdin() }
    }

    pub fn is_interactive(&self) -> bool {
        self.stdin.is_tty()
    }

    /// Print `prompt` and read a line.
    ///
    /// Returns `Ok(None)` at end of input.
    pub fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        let mut stdout = io::stdout();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;

        let mut line = String::new();
        match self.stdin.lock().read_line(&mut line)? {
            0 => Ok(None),
            _ => Ok(Some(line)),
        }
    }
}
