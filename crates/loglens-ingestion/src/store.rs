//! Collaborator seams and file registration
//!
//! [`LogSource`] is the object-storage side (list and download), [`LogStore`]
//! the relational side (register, insert, finalize). The pipeline only ever
//! talks to these traits; concrete adapters live in `loglens-infra`.

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tracing::{error, info};

use loglens_core::{FileId, FileRegistration, LogRecord, ObjectListing};

use crate::{IngestionError, Result};

/// Object storage holding the uploaded log files
#[async_trait]
pub trait LogSource: Send + Sync {
    /// One static listing of every candidate object
    async fn list_objects(&self) -> Result<Vec<ObjectListing>>;

    /// Raw bytes of one object
    async fn download_object(&self, name: &str) -> Result<Bytes>;
}

/// Relational store receiving registrations and error records
#[async_trait]
pub trait LogStore: Send + Sync {
    /// Insert one registration row and return the key assigned to exactly
    /// that row
    async fn register_file(&self, registration: &FileRegistration) -> Result<FileId>;

    /// Insert all records in one transaction; returns rows written
    async fn insert_records(&self, records: &[LogRecord], principal: &str) -> Result<u64>;

    /// Run the post-ingestion procedure
    async fn finalize(&self) -> Result<()>;
}

/// Writes the per-file metadata row
#[derive(Clone)]
pub struct FileRegistrar {
    store: Arc<dyn LogStore>,
}

impl FileRegistrar {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self { store }
    }

    pub async fn register(&self, registration: &FileRegistration) -> Result<FileId> {
        match self.store.register_file(registration).await {
            Ok(file_id) => {
                info!(
                    file = %registration.file_name,
                    server = %registration.server,
                    file_id = %file_id,
                    "Registered log file"
                );
                Ok(file_id)
            }
            Err(e) => {
                error!(
                    file = %registration.file_name,
                    error = %e,
                    "Failed to register log file"
                );
                Err(match e {
                    IngestionError::Registration(msg) => IngestionError::Registration(msg),
                    other => IngestionError::Registration(other.to_string()),
                })
            }
        }
    }
}
