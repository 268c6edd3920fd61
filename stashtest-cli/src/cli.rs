//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// stashtest -- regression tests for Logstash pipelines.
///
/// Use `stashtest <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "stashtest", version, about, long_about = None)]
pub struct Cli {
    /// Path to a stashtest.toml configuration file.
    ///
    /// When omitted, ./stashtest.toml is used if present, otherwise defaults.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Write a Prometheus text snapshot of the run's counters to this file.
    #[arg(long, global = true)]
    pub metrics_file: Option<PathBuf>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Deploy the pipelines in a container and run every test case.
    Run(RunArgs),

    /// Transform pipelines and parse fixtures without starting a container.
    Check(CheckArgs),
}

/// Where the pipelines and fixtures live.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Logstash configuration directory containing pipelines.yml.
    #[arg(short = 'c', long)]
    pub config_dir: PathBuf,

    /// Directory containing the test fixtures.
    #[arg(short, long)]
    pub tests: PathBuf,

    /// Directory containing the pipeline directories.
    #[arg(short, long)]
    pub pipelines: PathBuf,

    /// Path prefix to remove from path.config entries
    /// (default /usr/share/logstash/pipeline).
    #[arg(long)]
    pub pipelines_prefix: Option<String>,
}

// ---- run ----

/// Run all test cases against a live Logstash container.
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Docker image containing Logstash (default logstash:8.6.0).
    #[arg(short, long)]
    pub image: Option<String>,

    /// Use the local image without pulling it first.
    #[arg(long)]
    pub no_pull: bool,

    /// Directory for expected/actual files of failed comparisons.
    #[arg(long)]
    pub artifact_dir: Option<PathBuf>,
}

// ---- check ----

/// Validate pipelines and fixtures offline.
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub sources: SourceArgs,
}
