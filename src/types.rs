//! Core types shared across the crate: record identifiers, the task state
//! machine, in-flight tasks, and subscriber events.

use serde::{Deserialize, Serialize};

/// Unique identifier for a download record
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub i64);

impl RecordId {
    /// Create a new RecordId
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for RecordId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<RecordId> for i64 {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// Implement sqlx Type, Encode, and Decode for database operations
impl sqlx::Type<sqlx::Sqlite> for RecordId {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <i64 as sqlx::Type<sqlx::Sqlite>>::type_info()
    }

    fn compatible(ty: &sqlx::sqlite::SqliteTypeInfo) -> bool {
        <i64 as sqlx::Type<sqlx::Sqlite>>::compatible(ty)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for RecordId {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        sqlx::Encode::<sqlx::Sqlite>::encode_by_ref(&self.0, buf)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for RecordId {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let id = <i64 as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        Ok(Self(id))
    }
}

/// Download record status
///
/// `Waiting` and `Queuing` are both "not yet executing": the dispatcher uses
/// the distinction to tell freshly created records apart from records it has
/// already handed to the worker pool, so one record is never enqueued twice in
/// a dispatch cycle. `Ok`, `Error` and `Tle` are terminal; once reached no
/// further transition occurs and any re-attempt requires a new record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Created, not yet claimed by the dispatcher
    Waiting,
    /// Claimed by the dispatcher, sitting in the worker pool queue
    Queuing,
    /// A worker is executing the download
    Downloading,
    /// Fetched, validated and committed to the file store
    Ok,
    /// Failed during fetch, validation or commit
    Error,
    /// The external download tool exceeded the time limit
    Tle,
}

impl Status {
    /// Convert integer status code to Status enum
    pub fn from_i32(status: i32) -> Self {
        match status {
            0 => Status::Waiting,
            1 => Status::Queuing,
            2 => Status::Downloading,
            3 => Status::Ok,
            5 => Status::Tle,
            _ => Status::Error,
        }
    }

    /// Convert Status enum to integer status code
    pub fn to_i32(&self) -> i32 {
        match self {
            Status::Waiting => 0,
            Status::Queuing => 1,
            Status::Downloading => 2,
            Status::Ok => 3,
            Status::Error => 4,
            Status::Tle => 5,
        }
    }

    /// Whether no further automatic transition occurs from this status
    pub fn is_terminal(&self) -> bool {
        matches!(self, Status::Ok | Status::Error | Status::Tle)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Status::Waiting => "waiting",
            Status::Queuing => "queuing",
            Status::Downloading => "downloading",
            Status::Ok => "ok",
            Status::Error => "error",
            Status::Tle => "tle",
        };
        write!(f, "{}", name)
    }
}

/// Transient, in-memory unit of work submitted to the worker pool
///
/// Owned exclusively by the pool while queued or executing. Exactly one
/// in-flight task exists per persisted record id at any time; the dispatcher's
/// claim-then-enqueue protocol enforces this, not the task itself.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    /// Identifier of the persisted record this task executes
    pub id: RecordId,
    /// Target container in the file store
    pub container: String,
    /// Destination directory within the container
    pub dest_path: String,
    /// Remote resource locator
    pub source_url: String,
    /// Identity used for attribution on commit
    pub owner: String,
}

/// Events emitted by the downloader
///
/// Broadcast to all subscribers; dropped silently when no one is listening.
#[derive(Debug, Clone)]
pub enum Event {
    /// A record was claimed by the dispatcher and enqueued
    TaskQueued {
        /// Record that was enqueued
        id: RecordId,
    },
    /// A worker began executing a task
    TaskStarted {
        /// Record being executed
        id: RecordId,
    },
    /// A task completed successfully and its file was committed
    TaskCompleted {
        /// Record that completed
        id: RecordId,
        /// Byte size of the committed file
        size_bytes: u64,
    },
    /// A task failed during fetch, validation or commit
    TaskFailed {
        /// Record that failed
        id: RecordId,
        /// Human-readable failure detail (also persisted to the record)
        detail: String,
    },
    /// The external tool exceeded the configured time limit
    TaskTimedOut {
        /// Record that timed out
        id: RecordId,
    },
    /// The downloader is shutting down
    Shutdown,
}
