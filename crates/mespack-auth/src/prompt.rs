//! Interactive value input

use std::io::{self, stdin, stderr, BufRead, IsTerminal, Write};

/// Source of values the caller did not pass on the command line.
pub trait Prompter: Send {
    /// Ask for `label` and return the answer without its line terminator.
    fn prompt(&mut self, label: &str) -> io::Result<String>;
}

/// Reads answers from stdin, writing labels to stderr.
#[derive(Debug, Default)]
pub struct StdinPrompter;

impl StdinPrompter {
    pub fn new() -> Self {
        Self
    }

    /// Whether stdin is attached to a terminal.
    pub fn is_interactive() -> bool {
        stdin().is_terminal()
    }
}

impl Prompter for StdinPrompter {
    fn prompt(&mut self, label: &str) -> io::Result<String> {
        let mut err = stderr();
        write!(err, "{}: ", label)?;
        err.flush()?;

        let mut line = String::new();
        let read = stdin().lock().read_line(&mut line)?;
        if read == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("stdin closed while reading {}", label),
            ));
        }
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }
}
