pub mod blob;
pub mod database;

pub use blob::{
    build_object_store, ObjectStoreSource,
    upload::{BlobUploader, UploadFailure, UploadSummary, UploadedFile},
};

pub use database::{
    log_store::PgLogStore,
    migrations::run_migrations,
    pool::{connection_info, create_pool, ConnectionInfo, PgPoolConfig},
};

use loglens_ingestion::IngestionError;

#[derive(Debug, thiserror::Error)]
pub enum InfraError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, InfraError>;

impl From<InfraError> for IngestionError {
    fn from(err: InfraError) -> Self {
        match err {
            InfraError::Database(e) => IngestionError::Persistence(e.to_string()),
            InfraError::ObjectStore(e) => IngestionError::Transport(e.to_string()),
            InfraError::Io(e) => IngestionError::Transport(e.to_string()),
            InfraError::Migration(e) => IngestionError::Persistence(e.to_string()),
            InfraError::Configuration(msg) => IngestionError::Configuration(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_store_errors_map_to_transport() {
        let err = InfraError::ObjectStore(object_store::Error::NotFound {
            path: "SRV_ERRORLOG".to_string(),
            source: "missing".into(),
        });
        assert!(matches!(IngestionError::from(err), IngestionError::Transport(_)));
    }

    #[test]
    fn test_database_errors_map_to_persistence() {
        let err = InfraError::Database(sqlx::Error::RowNotFound);
        assert!(matches!(IngestionError::from(err), IngestionError::Persistence(_)));
    }
}
