//! Sync run history

use super::SqliteDirectoryStore;
use crate::error::{DirectoryError, Result};
use crate::models::{SyncRunRecord, SyncRunStatus};
use async_trait::async_trait;
use sqlx::FromRow;

#[async_trait]
pub trait SyncRunRepository: Send + Sync {
    /// Persist a new run record
    ///
    /// # Errors
    ///
    /// Returns an error if the connection does not exist
    async fn insert_sync_run(&self, run: &SyncRunRecord) -> Result<()>;

    /// Write the run's status, counters and completion fields
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the run does not exist
    async fn update_sync_run(&self, run: &SyncRunRecord) -> Result<()>;

    async fn find_sync_run(&self, id: &str) -> Result<Option<SyncRunRecord>>;

    /// Runs started at or after `since`, newest first.
    async fn list_recent_sync_runs(&self, since: i64, limit: u32) -> Result<Vec<SyncRunRecord>>;

    /// Runs still `running` that started before `started_before`.
    async fn list_stale_sync_runs(&self, started_before: i64) -> Result<Vec<SyncRunRecord>>;
}

#[derive(Debug, FromRow)]
struct SyncRunRow {
    id: String,
    connection_id: String,
    kind: String,
    status: String,
    started_at: i64,
    completed_at: Option<i64>,
    duration_secs: Option<i64>,
    records_processed: i64,
    records_created: i64,
    records_updated: i64,
    records_failed: i64,
    error_message: Option<String>,
}

impl TryFrom<SyncRunRow> for SyncRunRecord {
    type Error = DirectoryError;

    fn try_from(row: SyncRunRow) -> Result<Self> {
        Ok(SyncRunRecord {
            id: row.id,
            connection_id: row.connection_id,
            kind: row.kind.parse()?,
            status: row.status.parse()?,
            started_at: row.started_at,
            completed_at: row.completed_at,
            duration_secs: row.duration_secs,
            records_processed: row.records_processed,
            records_created: row.records_created,
            records_updated: row.records_updated,
            records_failed: row.records_failed,
            error_message: row.error_message,
        })
    }
}

const SYNC_RUN_COLUMNS: &str = "id, connection_id, kind, status, started_at, completed_at, \
     duration_secs, records_processed, records_created, records_updated, records_failed, \
     error_message";

#[async_trait]
impl SyncRunRepository for SqliteDirectoryStore {
    async fn insert_sync_run(&self, run: &SyncRunRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_runs (
                id, connection_id, kind, status, started_at, completed_at, duration_secs,
                records_processed, records_created, records_updated, records_failed,
                error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&run.id)
        .bind(&run.connection_id)
        .bind(run.kind.as_str())
        .bind(run.status.as_str())
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(run.duration_secs)
        .bind(run.records_processed)
        .bind(run.records_created)
        .bind(run.records_updated)
        .bind(run.records_failed)
        .bind(&run.error_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_sync_run(&self, run: &SyncRunRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE sync_runs SET
                status = ?, completed_at = ?, duration_secs = ?,
                records_processed = ?, records_created = ?, records_updated = ?,
                records_failed = ?, error_message = ?
            WHERE id = ?
            "#,
        )
        .bind(run.status.as_str())
        .bind(run.completed_at)
        .bind(run.duration_secs)
        .bind(run.records_processed)
        .bind(run.records_created)
        .bind(run.records_updated)
        .bind(run.records_failed)
        .bind(&run.error_message)
        .bind(&run.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DirectoryError::not_found("SyncRun", &run.id));
        }

        Ok(())
    }

    async fn find_sync_run(&self, id: &str) -> Result<Option<SyncRunRecord>> {
        let row = sqlx::query_as::<_, SyncRunRow>(&format!(
            "SELECT {} FROM sync_runs WHERE id = ?",
            SYNC_RUN_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SyncRunRecord::try_from).transpose()
    }

    async fn list_recent_sync_runs(&self, since: i64, limit: u32) -> Result<Vec<SyncRunRecord>> {
        let rows = sqlx::query_as::<_, SyncRunRow>(&format!(
            "SELECT {} FROM sync_runs WHERE started_at >= ?
             ORDER BY started_at DESC, rowid DESC LIMIT ?",
            SYNC_RUN_COLUMNS
        ))
        .bind(since)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(SyncRunRecord::try_from)
            .collect::<Result<Vec<_>>>()
    }

    async fn list_stale_sync_runs(&self, started_before: i64) -> Result<Vec<SyncRunRecord>> {
        let rows = sqlx::query_as::<_, SyncRunRow>(&format!(
            "SELECT {} FROM sync_runs WHERE status = ? AND started_at < ? ORDER BY started_at",
            SYNC_RUN_COLUMNS
        ))
        .bind(SyncRunStatus::Running.as_str())
        .bind(started_before)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(SyncRunRecord::try_from)
            .collect::<Result<Vec<_>>>()
    }
}
