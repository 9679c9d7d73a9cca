//! Command-line argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::output::OutputFormat;

/// Default file name for `--audit-log` given without a path
pub const DEFAULT_AUDIT_LOG: &str = "extraction_audit.log";

#[derive(Parser, Debug, Clone)]
#[command(
    name = "loglens",
    version,
    about = "Ingest database server error logs from object storage",
    long_about = "Collects database server log files into object storage, extracts \
                  `Error: <code>, Severity: <level>` lines and loads them into Postgres."
)]
pub struct Cli {
    /// Configuration file; environment variables prefixed LOGLENS_ override it
    #[arg(short, long, env = "LOGLENS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        short,
        long,
        env = "LOG_LEVEL",
        default_value = "info",
        value_parser = ["trace", "debug", "info", "warn", "error"]
    )]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "JSON_LOGS")]
    pub json_logs: bool,

    /// Also write logs as JSON lines to this file
    #[arg(
        long,
        value_name = "PATH",
        num_args = 0..=1,
        default_missing_value = DEFAULT_AUDIT_LOG
    )]
    pub audit_log: Option<PathBuf>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Ingest every log file in the container into the database
    Ingest {
        /// Files processed concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        /// Records per insert
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Exit with status 2 if any file, batch or the finalize step failed
        #[arg(long)]
        strict: bool,

        /// Summary format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Upload every file in a local directory to the container
    Upload {
        /// Directory holding the collected log files
        dir: PathBuf,

        /// Files uploaded concurrently
        #[arg(short, long)]
        workers: Option<usize>,

        /// Summary format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Apply database migrations
    Migrate,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert()
    }

    #[test]
    fn test_audit_log_without_value_uses_default() {
        let cli = Cli::parse_from(["loglens", "--audit-log", "--no-color", "migrate"]);
        assert_eq!(cli.audit_log, Some(PathBuf::from(DEFAULT_AUDIT_LOG)));
    }

    #[test]
    fn test_ingest_overrides() {
        let cli = Cli::parse_from(["loglens", "ingest", "--workers", "4", "-b", "250", "--format", "json"]);
        match cli.command {
            Commands::Ingest {
                workers,
                batch_size,
                strict,
                format,
            } => {
                assert_eq!(workers, Some(4));
                assert_eq!(batch_size, Some(250));
                assert!(!strict);
                assert_eq!(format, OutputFormat::Json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
