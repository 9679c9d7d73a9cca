//! Telemetry initialization (logging)

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::cli::Cli;

/// Guards that must be kept alive for the duration of the program
pub struct TelemetryGuards {
    _audit: Option<WorkerGuard>,
}

/// Initialize logging: console on stderr, plus the audit file when requested
pub fn init_telemetry(cli: &Cli) -> Result<TelemetryGuards> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .context("Failed to create environment filter")?;

    let (audit_writer, audit_guard) = match &cli.audit_log {
        Some(path) => {
            let (writer, guard) = audit_file(path)?;
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .with(audit_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(writer)
            }))
            .try_init()
            .context("Failed to install tracing subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(!cli.no_color)
                    .with_writer(std::io::stderr),
            )
            .with(audit_writer.map(|writer| {
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(writer)
            }))
            .try_init()
            .context("Failed to install tracing subscriber")?;
    }

    Ok(TelemetryGuards { _audit: audit_guard })
}

fn audit_file(path: &Path) -> Result<(NonBlocking, WorkerGuard)> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path
        .file_name()
        .with_context(|| format!("Audit log path has no file name: {}", path.display()))?;

    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create audit log directory {}", dir.display()))?;

    let appender = tracing_appender::rolling::never(dir, file_name);
    Ok(tracing_appender::non_blocking(appender))
}
