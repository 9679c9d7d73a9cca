//! Bounded ingestion worker pool
//!
//! One tokio task per source file, at most `max_workers` of them running at
//! once. Every failure, including a panic, stops only the file it happened in
//! and ends up in that file's [`FileReport`].

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use loglens_core::{FileId, FileRegistration, SourceFile};

use crate::batch::{BatchStats, BatchWriter};
use crate::encoding::EncodingResolver;
use crate::extractors::{split_lines, LineExtractor};
use crate::store::{FileRegistrar, LogSource};
use crate::IngestionError;

/// Step at which a file was abandoned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Download,
    Registration,
    /// Panicked or could not be scheduled
    Worker,
}

impl std::fmt::Display for FailureStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Download => "download",
            Self::Registration => "registration",
            Self::Worker => "worker",
        };
        f.write_str(name)
    }
}

/// How processing of one file ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FileOutcome {
    /// At least one record was extracted
    WithData,
    /// Registered, but no line parsed into a record
    NoMatchingLines,
    Failed { stage: FailureStage, error: String },
}

/// Per-file accounting
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub name: String,
    pub server: String,
    pub file_id: Option<FileId>,
    pub encoding: Option<String>,
    pub decode_fallback_used: bool,
    pub candidate_lines: usize,
    pub records_extracted: usize,
    pub batches: BatchStats,
    pub processing_time_ms: u64,
    pub outcome: FileOutcome,
}

impl FileReport {
    fn new(file: &SourceFile) -> Self {
        Self {
            name: file.name.clone(),
            server: file.server.clone(),
            file_id: None,
            encoding: None,
            decode_fallback_used: false,
            candidate_lines: 0,
            records_extracted: 0,
            batches: BatchStats::default(),
            processing_time_ms: 0,
            outcome: FileOutcome::NoMatchingLines,
        }
    }

    fn failed(mut self, stage: FailureStage, error: &IngestionError) -> Self {
        self.fail(stage, error);
        self
    }

    fn fail(&mut self, stage: FailureStage, error: &IngestionError) {
        self.outcome = FileOutcome::Failed {
            stage,
            error: error.to_string(),
        };
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, FileOutcome::Failed { .. })
    }
}

/// Everything a worker needs, shared by all workers of a run
pub struct WorkerContext {
    pub source: Arc<dyn LogSource>,
    pub registrar: FileRegistrar,
    pub writer: Arc<BatchWriter>,
    pub resolver: EncodingResolver,
    pub extractor: LineExtractor,
    /// Text marking a file as written by the listing's dialect
    pub dialect_marker: String,
}

impl WorkerContext {
    pub fn new(source: Arc<dyn LogSource>, registrar: FileRegistrar, writer: Arc<BatchWriter>) -> Self {
        Self {
            source,
            registrar,
            writer,
            resolver: EncodingResolver::new(),
            extractor: LineExtractor::new(),
            dialect_marker: "SQL Server".to_string(),
        }
    }

    pub fn with_dialect_marker(mut self, marker: impl Into<String>) -> Self {
        self.dialect_marker = marker.into();
        self
    }
}

/// Fixed-size pool processing one file per task
pub struct IngestionWorkerPool {
    context: Arc<WorkerContext>,
    permits: Arc<Semaphore>,
    max_workers: usize,
    tasks: JoinSet<FileReport>,
}

impl IngestionWorkerPool {
    pub fn new(context: Arc<WorkerContext>, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            context,
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            tasks: JoinSet::new(),
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Files submitted and not yet joined
    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    /// Schedule one file; it starts once a worker slot is free
    pub fn submit(&mut self, file: SourceFile) {
        let context = self.context.clone();
        let permits = self.permits.clone();

        self.tasks.spawn(async move {
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    let err = IngestionError::Worker("worker pool closed".to_string());
                    return FileReport::new(&file).failed(FailureStage::Worker, &err);
                }
            };

            let start = Instant::now();
            let mut report = FileReport::new(&file);
            let outcome = AssertUnwindSafe(process_file(&context, &file, &mut report))
                .catch_unwind()
                .await;
            report.processing_time_ms = start.elapsed().as_millis() as u64;

            match outcome {
                Ok(()) => report,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!(
                        file = %file.name,
                        file_id = ?report.file_id,
                        persisted = report.batches.records_persisted,
                        panic = %message,
                        "Worker panicked"
                    );
                    report.failed(FailureStage::Worker, &IngestionError::Worker(message))
                }
            }
        });
    }

    /// Wait for every submitted file; reports come back in completion order
    pub async fn join(mut self) -> Vec<FileReport> {
        let mut reports = Vec::with_capacity(self.tasks.len());

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => {
                    error!(error = %e, "Worker task failed");
                    reports.push(FileReport {
                        name: "unknown".to_string(),
                        server: "unknown".to_string(),
                        file_id: None,
                        encoding: None,
                        decode_fallback_used: false,
                        candidate_lines: 0,
                        records_extracted: 0,
                        batches: BatchStats::default(),
                        processing_time_ms: 0,
                        outcome: FileOutcome::Failed {
                            stage: FailureStage::Worker,
                            error: format!("Task failed: {}", e),
                        },
                    });
                }
            }
        }

        reports
    }
}

/// download, decode, filter, register, parse, batch
///
/// Progress lands in `report` as it happens, so a panic part way through
/// still leaves the file id and every flushed batch accounted for.
async fn process_file(context: &WorkerContext, file: &SourceFile, report: &mut FileReport) {
    info!(file = %file.name, server = %file.server, "Processing log file");

    let bytes = match context.source.download_object(&file.name).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(file = %file.name, error = %e, "Download failed, skipping file");
            report.fail(FailureStage::Download, &e);
            return;
        }
    };

    let decoded = context.resolver.decode(&bytes);
    drop(bytes);
    report.encoding = Some(decoded.encoding.to_string());
    report.decode_fallback_used = decoded.fallback_used;
    if decoded.fallback_used {
        warn!(file = %file.name, "Decoded with fallback encoding, text may be lossy");
    }

    let candidates = context.extractor.filter_candidate_lines(split_lines(&decoded.text));
    report.candidate_lines = candidates.len();
    debug!(file = %file.name, candidates = candidates.len(), "Filtered candidate lines");

    let dialect = file.dialect.refine(&decoded.text, &context.dialect_marker);
    let registration = FileRegistration::new(file, dialect, Utc::now(), context.writer.principal());

    let file_id = match context.registrar.register(&registration).await {
        Ok(file_id) => file_id,
        Err(e) => {
            report.fail(FailureStage::Registration, &e);
            return;
        }
    };
    report.file_id = Some(file_id);

    let mut batcher = context.writer.batcher(file_id);
    for line in candidates {
        if let Some(record) = context.extractor.parse_line(file_id, line) {
            report.records_extracted += 1;
            batcher.push(record).await;
            report.batches = batcher.stats();
        }
    }
    report.batches = batcher.finish().await;

    report.outcome = if report.records_extracted > 0 {
        FileOutcome::WithData
    } else {
        FileOutcome::NoMatchingLines
    };

    info!(
        file = %file.name,
        file_id = %file_id,
        records = report.records_extracted,
        persisted = report.batches.records_persisted,
        failed_batches = report.batches.batches_failed,
        "Log file ingested"
    );
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
