//! `loglens migrate`

use anyhow::{Context, Result};

use loglens_infra::run_migrations;

use crate::app::App;
use crate::output;

pub async fn run(app: &App) -> Result<()> {
    let store = app.log_store().await?;
    run_migrations(store.pool())
        .await
        .context("Failed to apply migrations")?;

    output::success("Database schema is up to date");
    Ok(())
}
