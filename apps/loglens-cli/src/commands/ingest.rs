//! `loglens ingest`

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::warn;

use loglens_ingestion::{MemoryDeadLetters, PipelineDriver};

use crate::app::App;
use crate::output::{self, OutputFormat};

/// Run one ingestion pass; returns whether the run was clean
pub async fn run(app: &App, format: OutputFormat) -> Result<bool> {
    let source = Arc::new(app.log_source()?);
    let store = Arc::new(app.log_store().await?);
    let dead_letters = Arc::new(MemoryDeadLetters::new());

    let driver = PipelineDriver::new(app.config.ingestion.clone(), source, store)
        .context("Invalid ingestion settings")?
        .with_dead_letters(dead_letters.clone());

    let summary = driver.run().await.context("Ingestion run aborted")?;

    for letter in dead_letters.drain() {
        warn!(
            file_id = %letter.file_id,
            records = letter.records.len(),
            error = %letter.error,
            failed_at = %letter.failed_at,
            "Batch was not persisted"
        );
    }

    output::print_run_summary(&summary, format)?;
    Ok(summary.is_clean())
}
