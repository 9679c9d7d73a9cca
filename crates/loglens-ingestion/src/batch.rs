//! Batched record persistence
//!
//! [`BatchWriter`] is shared by every worker. Each file gets its own
//! [`RecordBatcher`] that accumulates records and flushes them through the
//! writer whenever `batch_size` is reached. All flushes, from all workers,
//! pass through one write gate, so at most one insert transaction is open at
//! any time.
//!
//! A batch that fails to insert is logged, handed to the optional
//! [`DeadLetterSink`] and dropped. There is no retry.

use chrono::{DateTime, Utc};
use parking_lot::Mutex as SyncMutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use loglens_core::{FileId, LogRecord};

use crate::store::LogStore;
use crate::{IngestionError, Result};

/// A batch that could not be persisted
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub file_id: FileId,
    pub records: Vec<LogRecord>,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Receives batches the store rejected
pub trait DeadLetterSink: Send + Sync {
    fn record(&self, letter: DeadLetter);
}

/// Keeps rejected batches in memory
#[derive(Debug, Default)]
pub struct MemoryDeadLetters {
    letters: SyncMutex<Vec<DeadLetter>>,
}

impl MemoryDeadLetters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.letters.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.lock().is_empty()
    }

    /// Take every letter collected so far
    pub fn drain(&self) -> Vec<DeadLetter> {
        std::mem::take(&mut *self.letters.lock())
    }
}

impl DeadLetterSink for MemoryDeadLetters {
    fn record(&self, letter: DeadLetter) {
        self.letters.lock().push(letter);
    }
}

/// Per-file flush accounting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchStats {
    pub batches_flushed: u64,
    pub batches_failed: u64,
    pub records_persisted: u64,
    pub records_lost: u64,
}

/// Serialized writer for record batches
pub struct BatchWriter {
    store: Arc<dyn LogStore>,
    /// Held for the whole acquire, insert, commit, release sequence
    write_gate: Mutex<()>,
    batch_size: usize,
    principal: String,
    dead_letters: Option<Arc<dyn DeadLetterSink>>,
}

impl BatchWriter {
    pub fn new(store: Arc<dyn LogStore>, batch_size: usize, principal: impl Into<String>) -> Self {
        Self {
            store,
            write_gate: Mutex::new(()),
            batch_size: batch_size.max(1),
            principal: principal.into(),
            dead_letters: None,
        }
    }

    pub fn with_dead_letters(mut self, sink: Arc<dyn DeadLetterSink>) -> Self {
        self.dead_letters = Some(sink);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    /// Persist `records` in a single insert
    pub async fn flush(&self, records: &[LogRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        if records.len() > self.batch_size {
            return Err(IngestionError::BatchTooLarge {
                size: records.len(),
                limit: self.batch_size,
            });
        }

        let _gate = self.write_gate.lock().await;
        let written = self
            .store
            .insert_records(records, &self.principal)
            .await
            .map_err(|e| match e {
                IngestionError::Persistence(msg) => IngestionError::Persistence(msg),
                other => IngestionError::Persistence(other.to_string()),
            })?;

        debug!(records = records.len(), written, "Batch insert completed");
        Ok(written)
    }

    /// Run the store's post-ingestion procedure under the write gate
    pub async fn finalize(&self) -> Result<()> {
        let _gate = self.write_gate.lock().await;
        self.store.finalize().await.map_err(|e| match e {
            IngestionError::Finalize(msg) => IngestionError::Finalize(msg),
            other => IngestionError::Finalize(other.to_string()),
        })?;
        info!("Finalize procedure completed");
        Ok(())
    }

    /// Start accumulating records for one registered file
    pub fn batcher(&self, file_id: FileId) -> RecordBatcher<'_> {
        RecordBatcher {
            writer: self,
            file_id,
            pending: Vec::with_capacity(self.batch_size),
            stats: BatchStats::default(),
        }
    }

    fn dead_letter(&self, file_id: FileId, records: Vec<LogRecord>, error: &IngestionError) {
        if let Some(sink) = &self.dead_letters {
            sink.record(DeadLetter {
                file_id,
                records,
                error: error.to_string(),
                failed_at: Utc::now(),
            });
        }
    }
}

/// Accumulates one file's records and flushes them in order
pub struct RecordBatcher<'a> {
    writer: &'a BatchWriter,
    file_id: FileId,
    pending: Vec<LogRecord>,
    stats: BatchStats,
}

impl RecordBatcher<'_> {
    pub async fn push(&mut self, record: LogRecord) {
        self.pending.push(record);
        if self.pending.len() >= self.writer.batch_size {
            self.flush_pending().await;
        }
    }

    /// Flush whatever is left and return the accounting for this file
    pub async fn finish(mut self) -> BatchStats {
        self.flush_pending().await;
        self.stats
    }

    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    async fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }

        let batch = std::mem::replace(&mut self.pending, Vec::with_capacity(self.writer.batch_size));
        let size = batch.len() as u64;

        match self.writer.flush(&batch).await {
            Ok(_) => {
                self.stats.batches_flushed += 1;
                self.stats.records_persisted += size;
            }
            Err(e) => {
                error!(
                    file_id = %self.file_id,
                    records = size,
                    error = %e,
                    "Batch insert failed, records dropped"
                );
                self.stats.batches_failed += 1;
                self.stats.records_lost += size;
                self.writer.dead_letter(self.file_id, batch, &e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use loglens_core::{FileRegistration, MessageType};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingStore {
        batches: SyncMutex<Vec<Vec<LogRecord>>>,
        fail_calls: Vec<usize>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LogStore for RecordingStore {
        async fn register_file(&self, _registration: &FileRegistration) -> Result<FileId> {
            Ok(FileId::new(1))
        }

        async fn insert_records(&self, records: &[LogRecord], _principal: &str) -> Result<u64> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_calls.contains(&call) {
                return Err(IngestionError::Persistence("deadlock victim".to_string()));
            }
            self.batches.lock().push(records.to_vec());
            Ok(records.len() as u64)
        }

        async fn finalize(&self) -> Result<()> {
            Err(IngestionError::Persistence("procedure missing".to_string()))
        }
    }

    fn record(n: u32) -> LogRecord {
        LogRecord {
            file_id: FileId::new(1),
            logged_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_micro_opt(0, 0, 0, n)
                .unwrap(),
            message_type: MessageType::Error,
            error_code: n as i32,
            severity: 16,
        }
    }

    #[tokio::test]
    async fn test_flush_rejects_oversized_batch() {
        let store = Arc::new(RecordingStore::default());
        let writer = BatchWriter::new(store.clone(), 2, "tester");

        let result = writer.flush(&[record(1), record(2), record(3)]).await;
        assert!(matches!(result, Err(IngestionError::BatchTooLarge { size: 3, limit: 2 })));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_flush_empty_is_noop() {
        let store = Arc::new(RecordingStore::default());
        let writer = BatchWriter::new(store.clone(), 10, "tester");

        assert_eq!(writer.flush(&[]).await.unwrap(), 0);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_batcher_flush_counts() {
        let store = Arc::new(RecordingStore::default());
        let writer = BatchWriter::new(store.clone(), 4, "tester");

        let mut batcher = writer.batcher(FileId::new(1));
        for n in 0..10 {
            batcher.push(record(n)).await;
        }
        let stats = batcher.finish().await;

        let sizes: Vec<usize> = store.batches.lock().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(stats.batches_flushed, 3);
        assert_eq!(stats.records_persisted, 10);

        let flat: Vec<i32> = store.batches.lock().iter().flatten().map(|r| r.error_code).collect();
        assert_eq!(flat, (0..10).collect::<Vec<i32>>());
    }

    #[tokio::test]
    async fn test_exact_multiple_has_full_last_batch() {
        let store = Arc::new(RecordingStore::default());
        let writer = BatchWriter::new(store.clone(), 5, "tester");

        let mut batcher = writer.batcher(FileId::new(1));
        for n in 0..10 {
            batcher.push(record(n)).await;
        }
        batcher.finish().await;

        let sizes: Vec<usize> = store.batches.lock().iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![5, 5]);
    }

    #[tokio::test]
    async fn test_failed_batch_is_dead_lettered_and_processing_continues() {
        let store = Arc::new(RecordingStore {
            fail_calls: vec![0],
            ..Default::default()
        });
        let dead_letters = Arc::new(MemoryDeadLetters::new());
        let writer = BatchWriter::new(store.clone(), 3, "tester").with_dead_letters(dead_letters.clone());

        let mut batcher = writer.batcher(FileId::new(9));
        for n in 0..7 {
            batcher.push(record(n)).await;
        }
        let stats = batcher.finish().await;

        assert_eq!(
            stats,
            BatchStats {
                batches_flushed: 2,
                batches_failed: 1,
                records_persisted: 4,
                records_lost: 3,
            }
        );

        let letters = dead_letters.drain();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].file_id, FileId::new(9));
        assert_eq!(letters[0].records.len(), 3);
        assert!(letters[0].error.contains("deadlock victim"));
        assert!(dead_letters.is_empty());
    }

    #[tokio::test]
    async fn test_finalize_error_is_mapped() {
        let writer = BatchWriter::new(Arc::new(RecordingStore::default()), 3, "tester");
        let err = writer.finalize().await.unwrap_err();
        assert!(matches!(err, IngestionError::Finalize(_)));
    }
}
