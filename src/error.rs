//! Error types for offline-dl

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for offline-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for offline-dl
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "temp_dir")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Task processing error
    #[error("task error: {0}")]
    Task(#[from] TaskError),

    /// File store commit failed
    #[error("file store error: {0}")]
    FileStore(String),

    /// Invalid source URL
    #[error("invalid source URL '{url}': {reason}")]
    InvalidUrl {
        /// The URL that failed validation
        url: String,
        /// Why the URL was rejected
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Shutdown in progress - not accepting new records
    #[error("shutdown in progress: not accepting new records")]
    ShuttingDown,

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External download tool could not be executed
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),
}

/// Errors raised while processing a single download task
///
/// These are terminal for the task that raised them: the executor records the
/// message into the record's `error_detail` and transitions the record to
/// `Status::Error`. They never propagate past the worker's error barrier.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The external tool exited without producing any file
    #[error("no file downloaded")]
    NoFileDownloaded,

    /// The external tool produced more than one file
    #[error("ambiguous result: {count} files in scratch directory")]
    AmbiguousResult {
        /// Number of files found in the scratch directory
        count: usize,
    },

    /// The downloaded file disappeared between validation and commit
    #[error("downloaded file lost: {path}")]
    FileLost {
        /// The path that no longer exists
        path: PathBuf,
    },

    /// Could not create or reuse a scratch directory
    #[error("scratch directory error: {0}")]
    Scratch(String),
}
