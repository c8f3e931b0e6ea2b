//! Command execution primitives.

use serde::Serialize;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::utils::shell;

/// A fully built command: program plus arguments, no shell involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Shell-quoted rendering, for display only.
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        shell::quote_args(&parts)
    }
}

/// How a launched process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessExit {
    pub success: bool,
    /// `None` when the process was killed by a signal or never started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessExit {
    pub fn ok() -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            error: None,
        }
    }

    pub fn failed(exit_code: Option<i32>) -> Self {
        Self {
            success: false,
            exit_code,
            error: None,
        }
    }

    pub fn spawn_error(error: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code: None,
            error: Some(error.into()),
        }
    }
}

/// Runs a command to completion, or until `cancel` is raised.
pub trait ProcessLauncher {
    fn launch(&mut self, command: &CommandLine, cancel: &AtomicBool) -> ProcessExit;
}

/// Launches real child processes with stdio inherited from this process.
#[derive(Debug, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&mut self, command: &CommandLine, cancel: &AtomicBool) -> ProcessExit {
        run_inherited(command, cancel)
    }
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Run a command with inherited stdio and block until it exits. The child is
/// killed as soon as `cancel` is raised, even if it ignores SIGINT.
pub fn run_inherited(command: &CommandLine, cancel: &AtomicBool) -> ProcessExit {
    let spawned = Command::new(&command.program)
        .args(&command.args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            return ProcessExit::spawn_error(format!("Failed to run {}: {}", command.program, e))
        }
    };

    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return ProcessExit::ok(),
            Ok(Some(status)) => return ProcessExit::failed(status.code()),
            Ok(None) if cancel.load(Ordering::SeqCst) => {
                // Already exited if kill fails; wait reaps it either way.
                let _ = child.kill();
                let _ = child.wait();
                return ProcessExit::failed(None);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return ProcessExit::spawn_error(format!(
                    "Failed to wait for {}: {}",
                    command.program, e
                ));
            }
        }
    }
}
