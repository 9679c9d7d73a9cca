//! loglens CLI
//!
//! Collects database server logs into object storage and ingests their error
//! lines into Postgres.

mod app;
mod cli;
mod commands;
mod output;
mod telemetry;

use clap::Parser;
use colored::Colorize;
use std::process::ExitCode;
use tracing::{error, info};

use crate::app::App;
use crate::cli::{Cli, Commands};
use crate::telemetry::init_telemetry;

/// Exit status of a run that completed but was not clean under `--strict`
const EXIT_INCOMPLETE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let _guards = match init_telemetry(&cli) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    info!(version = env!("CARGO_PKG_VERSION"), "loglens starting");

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut app = App::load(&cli)?;

    match cli.command {
        Commands::Ingest {
            workers,
            batch_size,
            strict,
            format,
        } => {
            app.override_ingestion(workers, batch_size)?;
            let clean = commands::ingest::run(&app, format).await?;
            if strict && !clean {
                return Ok(ExitCode::from(EXIT_INCOMPLETE));
            }
        }
        Commands::Upload { dir, workers, format } => {
            if !commands::upload::run(&app, &dir, workers, format).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Migrate => commands::migrate::run(&app).await?,
    }

    Ok(ExitCode::SUCCESS)
}
