//! bulkup - Concurrent bulk uploads to S3-compatible object storage

mod commands;
mod exit_code;
mod output;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::commands::Commands;
use crate::exit_code::ExitCode;
use crate::output::OutputConfig;

/// Upload files and directory trees to S3-compatible storage
#[derive(Parser, Debug)]
#[command(name = "bulkup", version, about, long_about = None)]
pub struct Cli {
    /// Print machine-readable JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Only print errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the config file
    #[arg(short, long, global = true, env = "BULKUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set (e.g. info, bulkup_core=debug)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(&cli.log_level, cli.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {e:#}");
        return ExitCode::UsageError.into();
    }

    let output_config = OutputConfig {
        json: cli.json,
        no_color: cli.no_color,
        quiet: cli.quiet,
        no_progress: false,
    };
    if output_config.no_color {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    commands::execute(cli.command, cli.config.as_deref(), output_config)
        .await
        .into()
}

fn init_logging(level: &str, log_file: Option<&Path>) -> anyhow::Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .with_context(|| format!("invalid log level '{level}'"))?,
    };

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["bulkup", "config-info", "--json", "-q"]).unwrap();
        assert!(cli.json);
        assert!(cli.quiet);
        assert_eq!(cli.log_level, "warn");
    }

    #[test]
    fn test_missing_subcommand_is_an_error() {
        assert!(Cli::try_parse_from(["bulkup"]).is_err());
    }
}
