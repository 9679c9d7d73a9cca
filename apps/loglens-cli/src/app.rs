//! Configuration loading and adapter wiring

use anyhow::{Context, Result};
use tracing::{info, warn};

use loglens_core::AppConfig;
use loglens_infra::{connection_info, create_pool, BlobUploader, ObjectStoreSource, PgLogStore, PgPoolConfig};

use crate::cli::Cli;

/// Environment prefix for every setting, e.g. `LOGLENS_DATABASE__URL`
pub const ENV_PREFIX: &str = "LOGLENS";

pub struct App {
    pub config: AppConfig,
}

impl App {
    pub fn load(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => {
                let path = path
                    .to_str()
                    .with_context(|| format!("Config path is not valid UTF-8: {}", path.display()))?;
                AppConfig::load_from_file(path)
                    .with_context(|| format!("Failed to load configuration from {}", path))?
            }
            None => AppConfig::load_from_env(ENV_PREFIX).context("Failed to load configuration")?,
        };

        Ok(Self { config })
    }

    /// Apply command-line overrides and re-check the result
    pub fn override_ingestion(&mut self, workers: Option<usize>, batch_size: Option<usize>) -> Result<()> {
        if let Some(workers) = workers {
            self.config.ingestion.max_workers = workers;
        }
        if let Some(batch_size) = batch_size {
            self.config.ingestion.batch_size = batch_size;
        }
        self.config.validate().context("Invalid configuration")
    }

    pub async fn log_store(&self) -> Result<PgLogStore> {
        let database = &self.config.database;
        match connection_info(&database.url) {
            Ok(target) => info!(%target, "Connecting to database"),
            Err(e) => warn!(error = %e, "Could not parse database url"),
        }

        let pool = create_pool(&PgPoolConfig::from(database))
            .await
            .context("Failed to connect to database")?;

        PgLogStore::new(pool, self.config.ingestion.finalize_procedure.clone())
            .context("Failed to create log store")
    }

    pub fn log_source(&self) -> Result<ObjectStoreSource> {
        ObjectStoreSource::from_config(&self.config.storage).context("Failed to open object storage")
    }

    pub fn uploader(&self, workers: Option<usize>) -> Result<BlobUploader> {
        let source = self.log_source()?;
        let workers = workers.unwrap_or(self.config.ingestion.upload_workers);
        Ok(BlobUploader::new(source.store(), workers))
    }
}
