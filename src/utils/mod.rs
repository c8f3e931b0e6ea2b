//! Generic utility primitives with zero domain knowledge.
//!
//! - `command` - Command lines and child process launching
//! - `io` - File system helpers with consistent error handling
//! - `shell` - Shell quoting for display
//! - `template` - `%placeholder%` rendering

pub mod command;
pub mod io;
pub mod shell;
pub mod template;
