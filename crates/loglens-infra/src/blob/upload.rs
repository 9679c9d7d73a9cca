//! Log collector upload
//!
//! Pushes every regular file of a local directory into the container,
//! overwriting objects of the same name. Files are uploaded concurrently and
//! one failing file does not stop the others.

use futures::{stream, StreamExt};
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::Result;

#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub name: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadFailure {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadSummary {
    pub uploaded: Vec<UploadedFile>,
    pub failed: Vec<UploadFailure>,
}

impl UploadSummary {
    pub fn total(&self) -> usize {
        self.uploaded.len() + self.failed.len()
    }
}

pub struct BlobUploader {
    store: Arc<dyn ObjectStore>,
    workers: usize,
}

impl BlobUploader {
    pub fn new(store: Arc<dyn ObjectStore>, workers: usize) -> Self {
        Self {
            store,
            workers: workers.max(1),
        }
    }

    /// Upload every regular file directly inside `dir`
    pub async fn upload_dir(&self, dir: &Path) -> Result<UploadSummary> {
        let files = list_files(dir).await?;
        info!(dir = %dir.display(), files = files.len(), workers = self.workers, "Uploading log files");

        let results: Vec<(String, std::result::Result<u64, String>)> = stream::iter(files)
            .map(|path| async move {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                let result = self.upload_file(&path, &name).await;
                (name, result)
            })
            .buffer_unordered(self.workers)
            .collect()
            .await;

        let mut summary = UploadSummary::default();
        for (name, result) in results {
            match result {
                Ok(size_bytes) => summary.uploaded.push(UploadedFile { name, size_bytes }),
                Err(error) => summary.failed.push(UploadFailure { name, error }),
            }
        }
        summary.uploaded.sort_by(|a, b| a.name.cmp(&b.name));
        summary.failed.sort_by(|a, b| a.name.cmp(&b.name));

        info!(
            uploaded = summary.uploaded.len(),
            failed = summary.failed.len(),
            "Upload finished"
        );
        Ok(summary)
    }

    async fn upload_file(&self, path: &Path, name: &str) -> std::result::Result<u64, String> {
        let upload = async {
            let content = tokio::fs::read(path).await?;
            let size = content.len() as u64;
            self.store
                .put(&ObjectPath::from(name), PutPayload::from(content))
                .await?;
            Ok::<u64, crate::InfraError>(size)
        };

        match upload.await {
            Ok(size) => {
                info!(file = %name, size_bytes = size, "Uploaded log file");
                Ok(size)
            }
            Err(e) => {
                error!(file = %name, error = %e, "Failed to upload log file");
                Err(e.to_string())
            }
        }
    }
}

async fn list_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}
