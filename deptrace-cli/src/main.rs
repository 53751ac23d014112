//! deptrace CLI -- one-shot dependency scan of a directory, archive or URL.

mod cli;
mod commands;
mod error;
mod logging;
mod output;

use std::path::Path;

use clap::Parser;

use deptrace_core::config::DeptraceConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;
use crate::output::OutputWriter;

/// Configuration file picked up from the working directory when `--config` is absent.
const DEFAULT_CONFIG_FILE: &str = "deptrace.toml";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = load_config(cli.config.as_deref()).await?;

    if let Some(level) = cli.log_level {
        config.general.log_level = level;
        config.validate()?;
    }
    logging::init_tracing(&config.general).map_err(|e| CliError::Config(e.to_string()))?;
    deptrace_core::metrics::describe_all();

    let writer = OutputWriter::new(cli.output);
    match cli.command {
        Commands::Scan(args) => commands::scan::execute(args, &config, &writer).await,
    }
}

async fn load_config(explicit: Option<&Path>) -> Result<DeptraceConfig, CliError> {
    if let Some(path) = explicit {
        return Ok(DeptraceConfig::load(path).await?);
    }

    let fallback = Path::new(DEFAULT_CONFIG_FILE);
    if tokio::fs::try_exists(fallback).await.unwrap_or(false) {
        return Ok(DeptraceConfig::load(fallback).await?);
    }

    let mut config = DeptraceConfig::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
