use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

use loglens_core::DatabaseConfig;

use crate::{InfraError, Result};

#[derive(Debug, Clone)]
pub struct PgPoolConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
}

impl From<&DatabaseConfig> for PgPoolConfig {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            url: config.url.clone(),
            max_connections: config.max_connections,
            min_connections: config.min_connections,
            acquire_timeout: config.acquire_timeout(),
        }
    }
}

pub async fn create_pool(config: &PgPoolConfig) -> Result<PgPool> {
    let options: PgConnectOptions = config
        .url
        .parse()
        .map_err(|e: sqlx::Error| InfraError::Configuration(format!("invalid database url: {}", e)))?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_with(options)
        .await?;

    info!(
        max_connections = config.max_connections,
        min_connections = config.min_connections,
        "Database pool created"
    );

    Ok(pool)
}

/// Connection target without credentials, for audit logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub user: String,
}

impl std::fmt::Display for ConnectionInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "host={} port={} database={} user={}",
            self.host,
            self.port,
            self.database.as_deref().unwrap_or("-"),
            self.user
        )
    }
}

pub fn connection_info(url: &str) -> Result<ConnectionInfo> {
    let options: PgConnectOptions = url
        .parse()
        .map_err(|e: sqlx::Error| InfraError::Configuration(format!("invalid database url: {}", e)))?;

    Ok(ConnectionInfo {
        host: options.get_host().to_string(),
        port: options.get_port(),
        database: options.get_database().map(str::to_string),
        user: options.get_username().to_string(),
    })
}
