//! Terminal I/O utilities for CLI.
//!
//! Provides TTY detection, user prompting and the step banner.

use std::io::{self, BufRead, IsTerminal, Write};

use mvgmvs::toolchain::Prompter;

pub fn is_stdin_tty() -> bool {
    io::stdin().is_terminal()
}

pub fn prompt(message: &str) -> mvgmvs::Result<String> {
    eprint!("{}", message);
    io::stderr().flush().ok();

    let stdin = io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line).map_err(|e| {
        mvgmvs::Error::new(
            mvgmvs::ErrorCode::InternalIoError,
            format!("Failed to read input: {}", e),
            serde_json::Value::Null,
        )
    })?;

    Ok(line.trim().to_string())
}

/// Asks on stderr and reads the answer from stdin.
pub struct TtyPrompter;

impl Prompter for TtyPrompter {
    fn ask(&mut self, question: &str) -> mvgmvs::Result<String> {
        prompt(question)
    }
}

/// Print status message to stderr if running in a terminal.
pub fn status(message: &str) {
    if io::stderr().is_terminal() {
        eprintln!("{}", message);
    }
}

/// Step header, always printed. Reverse video on a terminal.
pub fn banner(message: &str) {
    if io::stderr().is_terminal() {
        eprintln!("\x1b[7m{}\x1b[0m", message);
    } else {
        eprintln!("{}", message);
    }
}

// log_status! macro is defined in lib.rs (#[macro_export]) and available crate-wide.
