//! Object storage adapters against a local file system store.

use pretty_assertions::assert_eq;
use std::sync::Arc;

use loglens_core::StorageConfig;
use loglens_infra::{build_object_store, BlobUploader, ObjectStoreSource};
use loglens_ingestion::{IngestionError, LogSource};

const ERRORLOG: &str = "2024-01-15 10:22:33.123456 spid5 Error: 18456, Severity: 14, State: 8.\n";

fn write(dir: &std::path::Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

#[tokio::test]
async fn test_upload_then_list_and_download() {
    let logs = tempfile::tempdir().unwrap();
    let container = tempfile::tempdir().unwrap();
    write(logs.path(), "SRV01_ERRORLOG", ERRORLOG);
    write(logs.path(), "SRV02_SQLAGENT.OUT", "agent started\n");
    std::fs::create_dir(logs.path().join("archive")).unwrap();

    let config = StorageConfig::local(container.path().to_string_lossy());
    let store = build_object_store(&config).unwrap();

    let summary = BlobUploader::new(store.clone(), 5)
        .upload_dir(logs.path())
        .await
        .unwrap();
    assert_eq!(summary.total(), 2);
    assert!(summary.failed.is_empty());

    let source = ObjectStoreSource::new(store);
    let listing = source.list_objects().await.unwrap();
    let names: Vec<&str> = listing.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["SRV01_ERRORLOG", "SRV02_SQLAGENT.OUT"]);
    assert_eq!(listing[0].size_bytes, ERRORLOG.len() as u64);

    let bytes = source.download_object("SRV01_ERRORLOG").await.unwrap();
    assert_eq!(&bytes[..], ERRORLOG.as_bytes());
}

#[tokio::test]
async fn test_upload_overwrites_existing_object() {
    let logs = tempfile::tempdir().unwrap();
    let container = tempfile::tempdir().unwrap();
    let store = build_object_store(&StorageConfig::local(container.path().to_string_lossy())).unwrap();
    let uploader = BlobUploader::new(store.clone(), 2);

    write(logs.path(), "SRV01_ERRORLOG", "first\n");
    uploader.upload_dir(logs.path()).await.unwrap();
    write(logs.path(), "SRV01_ERRORLOG", "second run\n");
    uploader.upload_dir(logs.path()).await.unwrap();

    let source = ObjectStoreSource::new(store);
    let bytes = source.download_object("SRV01_ERRORLOG").await.unwrap();
    assert_eq!(&bytes[..], b"second run\n");
}

#[tokio::test]
async fn test_prefix_scopes_listing() {
    let container = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(container.path().join("nightly")).unwrap();
    write(container.path(), "OTHER_ERRORLOG", ERRORLOG);
    write(&container.path().join("nightly"), "SRV01_ERRORLOG", ERRORLOG);

    let config = StorageConfig::local(container.path().to_string_lossy()).with_prefix("nightly");
    let source = ObjectStoreSource::from_config(&config).unwrap();

    let listing = source.list_objects().await.unwrap();
    assert_eq!(listing.len(), 1);
    assert_eq!(listing[0].name, "SRV01_ERRORLOG");
    assert!(source.download_object("SRV01_ERRORLOG").await.is_ok());
}

#[tokio::test]
async fn test_missing_object_is_transport_error() {
    let container = tempfile::tempdir().unwrap();
    let source = ObjectStoreSource::from_config(&StorageConfig::local(container.path().to_string_lossy())).unwrap();

    let err = source.download_object("SRV09_ERRORLOG").await.unwrap_err();
    assert!(matches!(err, IngestionError::Transport(_)));
}

#[tokio::test]
async fn test_upload_missing_directory_fails() {
    let container = tempfile::tempdir().unwrap();
    let store = build_object_store(&StorageConfig::local(container.path().to_string_lossy())).unwrap();

    let missing = container.path().join("does-not-exist");
    assert!(BlobUploader::new(Arc::clone(&store), 1).upload_dir(&missing).await.is_err());
}
