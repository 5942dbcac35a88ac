//! Database layer for offline-dl
//!
//! Handles SQLite persistence for download records. This is the only durable
//! state in the subsystem: the in-memory pool queue is a dispatch buffer, the
//! record table is the true backlog.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`records`] — Download record CRUD and status mutators

use sqlx::{FromRow, sqlite::SqlitePool};

mod migrations;
mod records;

/// New download record to be inserted into the database
///
/// Inserted in `Status::Waiting` on behalf of the host's ingestion side; the
/// dispatcher picks it up on the next cycle.
#[derive(Debug, Clone)]
pub struct NewDownloadRecord {
    /// Target container in the file store
    pub container: String,
    /// Destination directory within the container
    pub dest_path: String,
    /// Remote resource locator
    pub source_url: String,
    /// Identity used for attribution on commit
    pub owner: String,
}

/// Download record from database
#[derive(Debug, Clone, FromRow)]
pub struct DownloadRecord {
    /// Unique database ID
    pub id: i64,
    /// Target container in the file store
    pub container: String,
    /// Destination directory within the container
    pub dest_path: String,
    /// Remote resource locator
    pub source_url: String,
    /// Identity used for attribution on commit
    pub owner: String,
    /// Current status (see [`crate::types::Status`])
    pub status: i32,
    /// Byte size of the fetched artifact (0 until success)
    pub size_bytes: i64,
    /// Scratch directory reused across restarts for idempotent resumption
    pub scratch_path: Option<String>,
    /// Human-readable error detail on failure
    pub error_detail: Option<String>,
    /// Concrete path actually written on success (dest dir + filename)
    pub final_path: Option<String>,
    /// Unix timestamp when the record was created (never mutated)
    pub created_at: i64,
}

/// Database handle for offline-dl
pub struct Database {
    pool: SqlitePool,
}
