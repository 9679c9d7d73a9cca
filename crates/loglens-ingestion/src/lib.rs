//! Log Ingestion Pipeline for loglens
//!
//! Pulls server diagnostic logs out of object storage, decodes them, turns the
//! `Error: <code>, Severity: <level>` lines into structured records and writes
//! them to the relational store.
//!
//! # Features
//!
//! - Encoding detection with a byte-safe fallback decode
//! - Two-stage line extraction (substring filter, then strict parse)
//! - One registration row per file, detail rows written strictly after it
//! - Bounded batches serialized through a single write gate
//! - Per-file failure isolation across a bounded worker pool

pub mod batch;
pub mod encoding;
pub mod extractors;
pub mod pipeline;
pub mod pool;
pub mod store;

// Re-exports
pub use batch::{BatchStats, BatchWriter, DeadLetter, DeadLetterSink, MemoryDeadLetters, RecordBatcher};
pub use encoding::{DecodedText, EncodingGuess, EncodingResolver, FALLBACK_ENCODING, UNKNOWN_ENCODING};
pub use extractors::LineExtractor;
pub use pipeline::{FinalizeStatus, PipelineDriver, RunSummary};
pub use pool::{FailureStage, FileOutcome, FileReport, IngestionWorkerPool, WorkerContext};
pub use store::{FileRegistrar, LogSource, LogStore};

/// Error types for ingestion operations
#[derive(Debug, thiserror::Error)]
pub enum IngestionError {
    #[error("Failed to list source files: {0}")]
    Listing(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Registration failed: {0}")]
    Registration(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Batch of {size} records exceeds the limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },

    #[error("Finalize failed: {0}")]
    Finalize(String),

    #[error("Worker failed: {0}")]
    Worker(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

pub type Result<T> = std::result::Result<T, IngestionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IngestionError::Transport("connection reset".to_string());
        assert!(err.to_string().contains("Transport error"));

        let err = IngestionError::BatchTooLarge { size: 1001, limit: 1000 };
        assert_eq!(err.to_string(), "Batch of 1001 records exceeds the limit of 1000");
    }
}
