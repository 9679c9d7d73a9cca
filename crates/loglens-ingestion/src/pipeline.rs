//! Ingestion Run Driver
//!
//! Lists the source container once, pushes every file through the worker
//! pool, waits for all of them and only then runs the store's finalize
//! procedure.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use loglens_core::{DbDialect, IngestionConfig, SourceFile};

use crate::batch::{BatchWriter, DeadLetterSink};
use crate::pool::{FileOutcome, FileReport, IngestionWorkerPool, WorkerContext};
use crate::store::{FileRegistrar, LogSource, LogStore};
use crate::{IngestionError, Result};

/// Result of the post-ingestion procedure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "error", rename_all = "snake_case")]
pub enum FinalizeStatus {
    Completed,
    Failed(String),
    /// Nothing was listed, so nothing was finalized
    Skipped,
}

/// Outcome of one ingestion run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub principal: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub files: Vec<FileReport>,
    pub files_with_data: usize,
    pub files_without_matches: usize,
    pub files_failed: usize,
    pub records_persisted: u64,
    pub batches_failed: u64,
    pub finalize: FinalizeStatus,
}

impl RunSummary {
    fn empty(run_id: Uuid, principal: String, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            principal,
            started_at,
            finished_at: Utc::now(),
            files: Vec::new(),
            files_with_data: 0,
            files_without_matches: 0,
            files_failed: 0,
            records_persisted: 0,
            batches_failed: 0,
            finalize: FinalizeStatus::Skipped,
        }
    }

    fn tally(&mut self, files: Vec<FileReport>) {
        for report in &files {
            match report.outcome {
                FileOutcome::WithData => self.files_with_data += 1,
                FileOutcome::NoMatchingLines => self.files_without_matches += 1,
                FileOutcome::Failed { .. } => self.files_failed += 1,
            }
            self.records_persisted += report.batches.records_persisted;
            self.batches_failed += report.batches.batches_failed;
        }
        self.files = files;
    }

    pub fn total_files(&self) -> usize {
        self.files.len()
    }

    /// Every file ingested, every batch written and finalize done
    pub fn is_clean(&self) -> bool {
        self.files_failed == 0
            && self.batches_failed == 0
            && !matches!(self.finalize, FinalizeStatus::Failed(_))
    }
}

/// Runs one ingestion pass over the source container
pub struct PipelineDriver {
    config: IngestionConfig,
    source: Arc<dyn LogSource>,
    store: Arc<dyn LogStore>,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
    default_dialect: DbDialect,
}

impl PipelineDriver {
    pub fn new(config: IngestionConfig, source: Arc<dyn LogSource>, store: Arc<dyn LogStore>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| IngestionError::Configuration(e.to_string()))?;

        Ok(Self {
            config,
            source,
            store,
            dead_letters: None,
            default_dialect: DbDialect::default(),
        })
    }

    pub fn with_dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    pub fn with_default_dialect(mut self, dialect: DbDialect) -> Self {
        self.default_dialect = dialect;
        self
    }

    pub fn config(&self) -> &IngestionConfig {
        &self.config
    }

    /// List, ingest every file, then finalize. Only a failed listing is
    /// returned as an error; everything else is reported in the summary.
    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let principal = self.config.resolve_principal();

        info!(run_id = %run_id, principal = %principal, "Log ingestion run started");

        let listings = self.source.list_objects().await.map_err(|e| {
            error!(run_id = %run_id, error = %e, "Failed to list source files");
            match e {
                IngestionError::Listing(msg) => IngestionError::Listing(msg),
                other => IngestionError::Listing(other.to_string()),
            }
        })?;

        info!(run_id = %run_id, files = listings.len(), "Found source files");

        if listings.is_empty() {
            warn!(run_id = %run_id, "No source files found, nothing to do");
            return Ok(RunSummary::empty(run_id, principal, started_at));
        }

        let mut writer = BatchWriter::new(self.store.clone(), self.config.batch_size, principal.clone());
        if let Some(sink) = &self.dead_letters {
            writer = writer.with_dead_letters(sink.clone());
        }
        let writer = Arc::new(writer);

        let context = WorkerContext::new(
            self.source.clone(),
            FileRegistrar::new(self.store.clone()),
            writer.clone(),
        )
        .with_dialect_marker(self.config.dialect_marker.clone());

        let mut pool = IngestionWorkerPool::new(Arc::new(context), self.config.max_workers);
        for listing in listings {
            pool.submit(SourceFile::from_listing(listing, self.default_dialect));
        }

        // Finalize must only see a fully ingested run
        let reports = pool.join().await;

        let mut summary = RunSummary::empty(run_id, principal, started_at);
        summary.tally(reports);

        summary.finalize = match writer.finalize().await {
            Ok(()) => FinalizeStatus::Completed,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Finalize procedure failed");
                FinalizeStatus::Failed(e.to_string())
            }
        };
        summary.finished_at = Utc::now();

        info!(
            run_id = %run_id,
            files = summary.total_files(),
            with_data = summary.files_with_data,
            without_matches = summary.files_without_matches,
            failed = summary.files_failed,
            records = summary.records_persisted,
            failed_batches = summary.batches_failed,
            "Log ingestion run completed"
        );

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchStats;
    use crate::pool::FailureStage;

    fn report(name: &str, outcome: FileOutcome, persisted: u64, failed: u64) -> FileReport {
        FileReport {
            name: name.to_string(),
            server: "srv".to_string(),
            file_id: None,
            encoding: None,
            decode_fallback_used: false,
            candidate_lines: 0,
            records_extracted: 0,
            batches: BatchStats {
                batches_flushed: 0,
                batches_failed: failed,
                records_persisted: persisted,
                records_lost: 0,
            },
            processing_time_ms: 0,
            outcome,
        }
    }

    #[test]
    fn test_summary_tally() {
        let mut summary = RunSummary::empty(Uuid::new_v4(), "ops".to_string(), Utc::now());
        summary.tally(vec![
            report("a", FileOutcome::WithData, 1500, 1),
            report("b", FileOutcome::NoMatchingLines, 0, 0),
            report(
                "c",
                FileOutcome::Failed {
                    stage: FailureStage::Download,
                    error: "gone".to_string(),
                },
                0,
                0,
            ),
            report("d", FileOutcome::WithData, 20, 0),
        ]);

        assert_eq!(summary.total_files(), 4);
        assert_eq!(summary.files_with_data, 2);
        assert_eq!(summary.files_without_matches, 1);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.records_persisted, 1520);
        assert_eq!(summary.batches_failed, 1);
        assert!(!summary.is_clean());
    }

    #[test]
    fn test_empty_summary_is_clean() {
        let summary = RunSummary::empty(Uuid::new_v4(), "ops".to_string(), Utc::now());
        assert!(summary.is_clean());
        assert_eq!(summary.finalize, FinalizeStatus::Skipped);
    }

    #[test]
    fn test_finalize_status_serialization() {
        let json = serde_json::to_value(FinalizeStatus::Failed("timeout".to_string())).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"], "timeout");
    }
}
