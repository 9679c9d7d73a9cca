//! `loglens upload`

use anyhow::{bail, Context, Result};
use std::path::Path;

use crate::app::App;
use crate::output::{self, OutputFormat};

/// Upload a directory; returns whether every file made it
pub async fn run(app: &App, dir: &Path, workers: Option<usize>, format: OutputFormat) -> Result<bool> {
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }

    let uploader = app.uploader(workers)?;
    let summary = uploader
        .upload_dir(dir)
        .await
        .with_context(|| format!("Failed to upload {}", dir.display()))?;

    output::print_upload_summary(&summary, format)?;
    Ok(summary.failed.is_empty())
}
