//! stashtest CLI library
//!
//! Argument parsing, command handlers and output rendering for the
//! `stashtest` binary. Exposed as a library so integration tests can drive
//! the handlers without spawning a process.

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod metrics_snapshot;
pub mod output;
