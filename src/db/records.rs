//! Download record CRUD and the gateway mutators used by the executor and
//! dispatcher.
//!
//! Every mutating call commits immediately; there is no batching. Mutators
//! that target a missing id log a warning and return `Ok(())` rather than
//! erroring — by the time a worker reports on a record, failing the worker
//! over a vanished row would help no one.

use crate::error::DatabaseError;
use crate::types::{RecordId, Status};
use crate::{Error, Result};

use super::{Database, DownloadRecord, NewDownloadRecord};

const RECORD_COLUMNS: &str = "id, container, dest_path, source_url, owner, status, \
     size_bytes, scratch_path, error_detail, final_path, created_at";

impl Database {
    /// Insert a new record in `Status::Waiting`
    ///
    /// Called on behalf of the host's ingestion side; the dispatcher claims
    /// the record on its next cycle.
    pub async fn insert_record(&self, record: &NewDownloadRecord) -> Result<RecordId> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO download_records (
                container, dest_path, source_url, owner, status,
                size_bytes, created_at
            ) VALUES (?, ?, ?, ?, ?, 0, ?)
            "#,
        )
        .bind(&record.container)
        .bind(&record.dest_path)
        .bind(&record.source_url)
        .bind(&record.owner)
        .bind(Status::Waiting.to_i32())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert record: {}",
                e
            )))
        })?;

        Ok(RecordId(result.last_insert_rowid()))
    }

    /// Get a record by ID
    pub async fn get_record(&self, id: RecordId) -> Result<Option<DownloadRecord>> {
        let row = sqlx::query_as::<_, DownloadRecord>(&format!(
            "SELECT {} FROM download_records WHERE id = ?",
            RECORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get record: {}",
                e
            )))
        })?;

        Ok(row)
    }

    /// List records with a specific status, ordered by id
    ///
    /// Returns an empty vec when nothing matches; an `Err` means the query
    /// itself failed and callers treat it as "no work found this cycle".
    pub async fn list_by_status(&self, status: Status) -> Result<Vec<DownloadRecord>> {
        let rows = sqlx::query_as::<_, DownloadRecord>(&format!(
            "SELECT {} FROM download_records WHERE status = ? ORDER BY id ASC",
            RECORD_COLUMNS
        ))
        .bind(status.to_i32())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list records by status: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// List records belonging to one owner, newest first
    ///
    /// `start` must be non-negative and `limit` positive; used by hosts to
    /// back a per-user listing.
    pub async fn list_by_owner(
        &self,
        owner: &str,
        start: i64,
        limit: i64,
    ) -> Result<Vec<DownloadRecord>> {
        if start < 0 {
            return Err(Error::Other("start must be non-negative".into()));
        }
        if limit <= 0 {
            return Err(Error::Other("limit must be positive".into()));
        }

        let rows = sqlx::query_as::<_, DownloadRecord>(&format!(
            "SELECT {} FROM download_records WHERE owner = ? ORDER BY id DESC LIMIT ? OFFSET ?",
            RECORD_COLUMNS
        ))
        .bind(owner)
        .bind(limit)
        .bind(start)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list records by owner: {}",
                e
            )))
        })?;

        Ok(rows)
    }

    /// Update record status
    pub async fn set_status(&self, id: RecordId, status: Status) -> Result<()> {
        let result = sqlx::query("UPDATE download_records SET status = ? WHERE id = ?")
            .bind(status.to_i32())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update status: {}",
                    e
                )))
            })?;

        if result.rows_affected() == 0 {
            tracing::warn!(record_id = id.0, "No download record to update status on");
        }

        Ok(())
    }

    /// Update record status and error detail in one statement
    pub async fn set_status_with_detail(
        &self,
        id: RecordId,
        status: Status,
        detail: &str,
    ) -> Result<()> {
        let result =
            sqlx::query("UPDATE download_records SET status = ?, error_detail = ? WHERE id = ?")
                .bind(status.to_i32())
                .bind(detail)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    Error::Database(DatabaseError::QueryFailed(format!(
                        "Failed to update status: {}",
                        e
                    )))
                })?;

        if result.rows_affected() == 0 {
            tracing::warn!(record_id = id.0, "No download record to update status on");
        }

        Ok(())
    }

    /// Persist the scratch directory used by the current attempt
    ///
    /// Read back on restart so an interrupted download resumes into the same
    /// directory instead of starting over.
    pub async fn set_scratch_path(&self, id: RecordId, path: &str) -> Result<()> {
        let result = sqlx::query("UPDATE download_records SET scratch_path = ? WHERE id = ?")
            .bind(path)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update scratch path: {}",
                    e
                )))
            })?;

        if result.rows_affected() == 0 {
            tracing::warn!(record_id = id.0, "No download record to set scratch path on");
        }

        Ok(())
    }

    /// Record the byte size of the fetched artifact
    pub async fn set_file_size(&self, id: RecordId, size: u64) -> Result<()> {
        let result = sqlx::query("UPDATE download_records SET size_bytes = ? WHERE id = ?")
            .bind(size as i64)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update file size: {}",
                    e
                )))
            })?;

        if result.rows_affected() == 0 {
            tracing::warn!(record_id = id.0, "No download record to set file size on");
        }

        Ok(())
    }

    /// Record the concrete path actually written on success
    ///
    /// `dest_path` names a directory until completion; this stores the full
    /// path including the downloaded filename so consumers of the record know
    /// exactly where the artifact landed.
    pub async fn set_final_path(&self, id: RecordId, path: &str) -> Result<()> {
        let result = sqlx::query("UPDATE download_records SET final_path = ? WHERE id = ?")
            .bind(path)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to update final path: {}",
                    e
                )))
            })?;

        if result.rows_affected() == 0 {
            tracing::warn!(record_id = id.0, "No download record to set final path on");
        }

        Ok(())
    }
}
