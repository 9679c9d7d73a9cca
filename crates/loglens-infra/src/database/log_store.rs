//! Postgres-backed [`LogStore`]
//!
//! `log_details` receives one row per file and hands back its key through
//! `RETURNING`, so concurrent registrations can never see each other's id.
//! Record batches go to `log_messages` as a single multi-row insert inside a
//! transaction.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use sqlx::{Postgres, QueryBuilder};
use tracing::{debug, info};

use loglens_core::{is_sql_identifier, FileId, FileRegistration, LogRecord};
use loglens_ingestion::{IngestionError, LogStore};

use crate::{InfraError, Result};

/// Postgres caps a statement at 65535 bind parameters
const MAX_BIND_PARAMS: usize = u16::MAX as usize;
const BINDS_PER_RECORD: usize = 6;

pub struct PgLogStore {
    pool: PgPool,
    finalize_procedure: String,
}

impl PgLogStore {
    pub fn new(pool: PgPool, finalize_procedure: impl Into<String>) -> Result<Self> {
        let finalize_procedure = finalize_procedure.into();
        if !is_sql_identifier(&finalize_procedure) {
            return Err(InfraError::Configuration(format!(
                "invalid procedure name: {:?}",
                finalize_procedure
            )));
        }
        Ok(Self {
            pool,
            finalize_procedure,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Largest batch a single insert statement can carry
    pub const fn max_batch_records() -> usize {
        MAX_BIND_PARAMS / BINDS_PER_RECORD
    }

    async fn insert_details(&self, registration: &FileRegistration) -> Result<i64> {
        let log_id = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO log_details (
                server_name, log_file_name, log_file_size_kb, log_file_type, source,
                db_type, logfile_gen_date, log_extracted_time, euser
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING log_id
            "#,
        )
        .bind(&registration.server)
        .bind(&registration.file_name)
        .bind(registration.size_kb)
        .bind(registration.category.as_str())
        .bind(&registration.source)
        .bind(registration.dialect.as_str())
        .bind(registration.generated_at)
        .bind(registration.extracted_at)
        .bind(&registration.principal)
        .fetch_one(&self.pool)
        .await?;

        Ok(log_id)
    }

    async fn insert_messages(&self, records: &[LogRecord], principal: &str) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO log_messages (log_id, log_date, log_message_type, error_code, severity, euser) ",
        );
        builder.push_values(records, |mut row, record| {
            row.push_bind(record.file_id.get())
                .push_bind(record.logged_at)
                .push_bind(record.message_type.as_str())
                .push_bind(record.error_code)
                .push_bind(record.severity)
                .push_bind(principal);
        });

        let result = builder.build().execute(&mut *tx).await?;
        tx.commit().await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl LogStore for PgLogStore {
    async fn register_file(&self, registration: &FileRegistration) -> loglens_ingestion::Result<FileId> {
        let log_id = self
            .insert_details(registration)
            .await
            .map_err(|e| IngestionError::Registration(e.to_string()))?;
        Ok(FileId::new(log_id))
    }

    async fn insert_records(&self, records: &[LogRecord], principal: &str) -> loglens_ingestion::Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        if records.len() > Self::max_batch_records() {
            return Err(IngestionError::BatchTooLarge {
                size: records.len(),
                limit: Self::max_batch_records(),
            });
        }

        let written = self
            .insert_messages(records, principal)
            .await
            .map_err(|e| IngestionError::Persistence(e.to_string()))?;
        debug!(records = written, "Inserted log messages");
        Ok(written)
    }

    async fn finalize(&self) -> loglens_ingestion::Result<()> {
        let statement = format!("CALL {}()", self.finalize_procedure);
        sqlx::query(&statement)
            .execute(&self.pool)
            .await
            .map_err(|e| IngestionError::Finalize(e.to_string()))?;

        info!(procedure = %self.finalize_procedure, "Called finalize procedure");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loglens_core::MAX_BATCH_SIZE;

    #[test]
    fn test_configured_ceiling_fits_bind_limit() {
        assert!(MAX_BATCH_SIZE <= PgLogStore::max_batch_records());
    }
}
