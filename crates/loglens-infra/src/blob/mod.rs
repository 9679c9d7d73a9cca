//! Object storage access
//!
//! The same [`ObjectStore`] handle serves both directions: the ingest run
//! lists and downloads through [`ObjectStoreSource`], the collector uploads
//! through [`upload::BlobUploader`].

pub mod upload;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::prefix::PrefixStore;
use object_store::ObjectStore;
use std::sync::Arc;
use tracing::{debug, info};

use loglens_core::{ObjectListing, StorageBackend, StorageConfig};
use loglens_ingestion::{IngestionError, LogSource};

use crate::{InfraError, Result};

/// Build the configured backend, scoped to `prefix` when one is set
pub fn build_object_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    let store: Arc<dyn ObjectStore> = match config.backend {
        StorageBackend::Local => {
            let root = config.root.as_deref().ok_or_else(|| {
                InfraError::Configuration("storage.root is required for the local backend".to_string())
            })?;
            std::fs::create_dir_all(root)?;
            Arc::new(LocalFileSystem::new_with_prefix(root)?)
        }
        StorageBackend::Azure => {
            use object_store::azure::MicrosoftAzureBuilder;

            let mut builder = MicrosoftAzureBuilder::from_env().with_container_name(&config.container);
            if let Some(account) = &config.account {
                builder = builder.with_account(account);
            }
            if let Some(key) = &config.access_key {
                builder = builder.with_access_key(key);
            }
            Arc::new(builder.build()?)
        }
    };

    let Some(prefix) = config.prefix.as_deref().filter(|p| !p.is_empty()) else {
        return Ok(store);
    };

    Ok(Arc::new(PrefixStore::new(store, prefix)))
}

/// Lists and downloads log objects from an [`ObjectStore`]
pub struct ObjectStoreSource {
    store: Arc<dyn ObjectStore>,
}

impl ObjectStoreSource {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        Ok(Self::new(build_object_store(config)?))
    }

    pub fn store(&self) -> Arc<dyn ObjectStore> {
        self.store.clone()
    }
}

#[async_trait]
impl LogSource for ObjectStoreSource {
    async fn list_objects(&self) -> loglens_ingestion::Result<Vec<ObjectListing>> {
        let mut objects: Vec<ObjectListing> = self
            .store
            .list(None)
            .map_ok(|meta| ObjectListing::new(meta.location.to_string(), meta.size as u64, meta.last_modified))
            .try_collect()
            .await
            .map_err(|e| IngestionError::Listing(e.to_string()))?;

        objects.sort_by(|a, b| a.name.cmp(&b.name));
        info!(objects = objects.len(), "Listed source objects");
        Ok(objects)
    }

    async fn download_object(&self, name: &str) -> loglens_ingestion::Result<Bytes> {
        let location = Path::from(name);
        let bytes = self
            .store
            .get(&location)
            .await
            .map_err(InfraError::from)?
            .bytes()
            .await
            .map_err(InfraError::from)?;

        debug!(object = %name, size = bytes.len(), "Downloaded object");
        Ok(bytes)
    }
}
