//! Command implementations for the CLI.
//!
//! Each command is implemented in its own module.

pub mod build;
pub mod classify;
pub mod init;
pub mod watch;
