//! Command-line surface tests for the `loglens` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn loglens() -> Command {
    let mut cmd = Command::cargo_bin("loglens").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("LOGLENS_CONFIG")
        .env("LOG_LEVEL", "warn")
        .arg("--no-color");
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    loglens()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ingest"))
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("migrate"));
}

#[test]
fn test_upload_copies_directory_into_container() {
    let logs = tempfile::tempdir().unwrap();
    let container = tempfile::tempdir().unwrap();
    std::fs::write(logs.path().join("SRV01_ERRORLOG"), "Error: 1, Severity: 2\n").unwrap();
    std::fs::write(logs.path().join("SRV01_SQLAGENT.OUT"), "agent\n").unwrap();

    loglens()
        .env("LOGLENS_STORAGE__ROOT", container.path())
        .args(["upload", "--format", "json"])
        .arg(logs.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"uploaded\""))
        .stdout(predicate::str::contains("SRV01_ERRORLOG"));

    assert!(container.path().join("SRV01_ERRORLOG").is_file());
    assert!(container.path().join("SRV01_SQLAGENT.OUT").is_file());
}

#[test]
fn test_upload_rejects_missing_directory() {
    let container = tempfile::tempdir().unwrap();

    loglens()
        .env("LOGLENS_STORAGE__ROOT", container.path())
        .args(["upload", "/definitely/not/here"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Not a directory"));
}

#[test]
fn test_ingest_rejects_zero_batch_size() {
    let container = tempfile::tempdir().unwrap();

    loglens()
        .env("LOGLENS_STORAGE__ROOT", container.path())
        .args(["ingest", "--batch-size", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid configuration"));
}

#[test]
fn test_unknown_format_is_rejected() {
    loglens()
        .args(["ingest", "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown format"));
}
