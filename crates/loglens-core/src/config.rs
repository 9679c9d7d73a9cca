use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Upper bound for `ingestion.batch_size`; one log_messages row binds six
/// parameters and Postgres caps a statement at 65535.
pub const MAX_BATCH_SIZE: usize = 10_000;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub ingestion: IngestionConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_env("LOGLENS")
    }

    /// Load configuration from environment with custom prefix
    pub fn load_from_env(prefix: &str) -> Result<Self, ConfigError> {
        let builder = Self::with_defaults(Config::builder())?.add_source(
            Environment::with_prefix(prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file with environment overrides
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        let builder = Self::with_defaults(Config::builder())?
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("LOGLENS")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        let config: Self = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("storage.backend", "local")?
            .set_default("storage.root", "./logs")?
            .set_default("storage.container", default_container())?
            .set_default("database.url", "postgres://localhost/loglens")?
            .set_default("database.max_connections", default_max_connections())?
            .set_default("database.min_connections", default_min_connections())?
            .set_default(
                "database.acquire_timeout_seconds",
                default_acquire_timeout_seconds(),
            )?
            .set_default("ingestion.max_workers", default_max_workers() as u64)?
            .set_default("ingestion.batch_size", default_batch_size() as u64)?
            .set_default("ingestion.finalize_procedure", default_finalize_procedure())?
            .set_default("ingestion.dialect_marker", default_dialect_marker())?
            .set_default("ingestion.upload_workers", default_upload_workers() as u64)
    }

    /// Check the cross-field constraints that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.storage.validate()?;
        self.ingestion.validate()
    }
}

/// Where source log files live
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// A directory on the local file system
    #[default]
    Local,
    /// An Azure Blob Storage container
    Azure,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Root directory for the local backend
    #[serde(default)]
    pub root: Option<String>,
    #[serde(default = "default_container")]
    pub container: String,
    /// Storage account name (azure)
    #[serde(default)]
    pub account: Option<String>,
    /// Storage account key (azure)
    #[serde(default)]
    pub access_key: Option<String>,
    /// Only objects under this prefix are listed
    #[serde(default)]
    pub prefix: Option<String>,
}

impl StorageConfig {
    pub fn local(root: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Local,
            root: Some(root.into()),
            container: default_container(),
            account: None,
            access_key: None,
            prefix: None,
        }
    }

    pub fn azure(account: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            backend: StorageBackend::Azure,
            root: None,
            container: container.into(),
            account: Some(account.into()),
            access_key: None,
            prefix: None,
        }
    }

    pub fn with_access_key(mut self, key: impl Into<String>) -> Self {
        self.access_key = Some(key.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            StorageBackend::Local if self.root.as_deref().map_or(true, str::is_empty) => Err(
                ConfigError::Message("storage.root is required for the local backend".into()),
            ),
            StorageBackend::Azure if self.container.is_empty() => Err(ConfigError::Message(
                "storage.container is required for the azure backend".into(),
            )),
            _ => Ok(()),
        }
    }
}

fn default_container() -> String {
    "logs".to_string()
}

/// Database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_acquire_timeout_seconds")]
    pub acquire_timeout_seconds: u64,
}

impl DatabaseConfig {
    pub fn new(url: String) -> Self {
        Self {
            url,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout_seconds: default_acquire_timeout_seconds(),
        }
    }

    pub fn with_pool_size(mut self, min: u32, max: u32) -> Self {
        self.min_connections = min;
        self.max_connections = max;
        self
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_seconds)
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_acquire_timeout_seconds() -> u64 {
    30
}

/// Ingestion pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    /// Files processed concurrently
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Records per insert statement
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Procedure called once after every file has been ingested
    #[serde(default = "default_finalize_procedure")]
    pub finalize_procedure: String,
    /// Recorded as the acting principal; falls back to the OS user
    #[serde(default)]
    pub principal: Option<String>,
    /// Text whose presence marks a log as written by SQL Server
    #[serde(default = "default_dialect_marker")]
    pub dialect_marker: String,
    /// Files uploaded concurrently by `loglens upload`
    #[serde(default = "default_upload_workers")]
    pub upload_workers: usize,
}

impl IngestionConfig {
    pub fn new() -> Self {
        Self {
            max_workers: default_max_workers(),
            batch_size: default_batch_size(),
            finalize_procedure: default_finalize_procedure(),
            principal: None,
            dialect_marker: default_dialect_marker(),
            upload_workers: default_upload_workers(),
        }
    }

    pub fn with_max_workers(mut self, workers: usize) -> Self {
        self.max_workers = workers;
        self
    }

    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size;
        self
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    pub fn with_finalize_procedure(mut self, procedure: impl Into<String>) -> Self {
        self.finalize_procedure = procedure.into();
        self
    }

    /// The configured principal, else the user running the process
    pub fn resolve_principal(&self) -> String {
        self.principal
            .clone()
            .filter(|p| !p.trim().is_empty())
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .unwrap_or_else(|| "unknown".to_string())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::Message(
                "ingestion.max_workers must be at least 1".into(),
            ));
        }
        if self.upload_workers == 0 {
            return Err(ConfigError::Message(
                "ingestion.upload_workers must be at least 1".into(),
            ));
        }
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Message(format!(
                "ingestion.batch_size must be between 1 and {}",
                MAX_BATCH_SIZE
            )));
        }
        if !is_sql_identifier(&self.finalize_procedure) {
            return Err(ConfigError::Message(format!(
                "ingestion.finalize_procedure is not a valid identifier: {:?}",
                self.finalize_procedure
            )));
        }
        Ok(())
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// `name` or `schema.name`, letters, digits and underscores only
pub fn is_sql_identifier(value: &str) -> bool {
    let parts: Vec<&str> = value.split('.').collect();
    parts.len() <= 2
        && parts.iter().all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

fn default_max_workers() -> usize {
    16
}

fn default_batch_size() -> usize {
    1000
}

fn default_finalize_procedure() -> String {
    "update_log_messages".to_string()
}

fn default_dialect_marker() -> String {
    "SQL Server".to_string()
}

fn default_upload_workers() -> usize {
    5
}
