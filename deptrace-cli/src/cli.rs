//! CLI argument parsing using clap derive API
//!
//! This module defines the command-line interface structure using clap's derive macros.
//! It is purely declarative with no side effects or I/O.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// deptrace -- software composition analysis for directories, archives and URLs.
///
/// Use `deptrace <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "deptrace", version, about, long_about = None)]
pub struct Cli {
    /// Path to the deptrace.toml configuration file (default: ./deptrace.toml if present).
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a data origin and print its dependency risk summary.
    Scan(ScanArgs),
}

// ---- scan ----

/// Run a one-shot dependency scan.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Directory, file, archive, file:// or http(s):// URL to scan.
    pub origin: String,

    /// Display name (default: last path segment of the origin).
    #[arg(long)]
    pub name: Option<String>,

    /// Task timeout in seconds, overriding scan.timeout_secs (0 = unlimited).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Analyzer to run; repeat for several (default: all registered analyzers).
    #[arg(long = "analyzer", value_name = "NAME")]
    pub analyzers: Vec<String>,

    /// Report only vulnerable components (also scan.vuln_only).
    #[arg(long)]
    pub vuln_only: bool,
}
