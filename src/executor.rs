//! Per-task download execution.
//!
//! One [`DownloadExecutor::process`] call takes a claimed task through the
//! whole pipeline: mark DOWNLOADING, resolve a scratch directory, run the
//! external tool under the time limit, validate the result, commit it to the
//! file store, persist size and final path, and clean up. Any failure between
//! scratch resolution and the final status write lands the record in
//! `Status::Error` with the failure text persisted; the scratch directory is
//! removed on every exit path.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::config::Config;
use crate::db::Database;
use crate::error::TaskError;
use crate::fetcher::UrlFetcher;
use crate::pool::TaskProcessor;
use crate::store::FileStore;
use crate::types::{DownloadTask, Event, RecordId, Status};

/// Name of the append-mode log file receiving external tool output
pub const TOOL_LOG_FILE: &str = "offline_download.log";

enum Outcome {
    Completed { size_bytes: u64 },
    TimedOut,
}

/// Executes one download task end to end
///
/// Shared by all pool workers; holds only `Arc`s and immutable configuration.
pub struct DownloadExecutor {
    db: Arc<Database>,
    fetcher: Arc<dyn UrlFetcher>,
    store: Arc<dyn FileStore>,
    config: Arc<Config>,
    event_tx: broadcast::Sender<Event>,
}

impl DownloadExecutor {
    /// Create an executor over the given collaborators
    pub fn new(
        db: Arc<Database>,
        fetcher: Arc<dyn UrlFetcher>,
        store: Arc<dyn FileStore>,
        config: Arc<Config>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            db,
            fetcher,
            store,
            config,
            event_tx,
        }
    }

    fn time_limit(&self) -> Duration {
        self.config.workers.time_limit
    }

    fn tool_log_path(&self) -> PathBuf {
        self.config.persistence.log_dir.join(TOOL_LOG_FILE)
    }

    fn emit(&self, event: Event) {
        // send() errs when no one is subscribed, which is fine
        self.event_tx.send(event).ok();
    }

    /// Persistence failures inside the executor are transient: log and move
    /// on, the record is re-observed on the next recovery pass.
    async fn set_status_logged(&self, id: RecordId, status: Status) {
        if let Err(e) = self.db.set_status(id, status).await {
            tracing::warn!(record_id = id.0, error = %e, "Failed to persist status");
        }
    }

    /// Reuse the scratch directory persisted on the record if it still exists
    /// on disk, otherwise create a fresh unique one under the temp root and
    /// persist its path
    ///
    /// Reuse is what makes a restart resume a partially fetched file instead
    /// of starting over.
    async fn resolve_scratch_dir(&self, id: RecordId) -> crate::Result<PathBuf> {
        let persisted = match self.db.get_record(id).await {
            Ok(record) => record.and_then(|r| r.scratch_path),
            Err(e) => {
                tracing::warn!(record_id = id.0, error = %e, "Failed to read scratch path");
                None
            }
        };

        if let Some(path) = persisted {
            let dir = PathBuf::from(&path);
            if dir.is_dir() {
                tracing::debug!(record_id = id.0, scratch = %dir.display(), "Reusing scratch directory");
                return Ok(dir);
            }
        }

        tokio::fs::create_dir_all(&self.config.persistence.temp_dir)
            .await
            .map_err(|e| TaskError::Scratch(format!("cannot create temp root: {}", e)))?;

        let dir = tempfile::Builder::new()
            .prefix("offline-dl-")
            .tempdir_in(&self.config.persistence.temp_dir)
            .map_err(|e| TaskError::Scratch(format!("cannot create scratch directory: {}", e)))?
            .keep();

        tracing::debug!(record_id = id.0, scratch = %dir.display(), "Created scratch directory");
        if let Err(e) = self.db.set_scratch_path(id, &dir.to_string_lossy()).await {
            tracing::warn!(record_id = id.0, error = %e, "Failed to persist scratch path");
        }

        Ok(dir)
    }

    /// Steps 2-7: scratch resolution, fetch, validation, commit, size and
    /// final path recording
    ///
    /// `scratch` is filled in as soon as the directory is known so the caller
    /// can clean up regardless of where this returns.
    async fn run(&self, task: &DownloadTask, scratch: &mut Option<PathBuf>) -> crate::Result<Outcome> {
        let scratch_dir = self.resolve_scratch_dir(task.id).await?;
        *scratch = Some(scratch_dir.clone());

        let log_path = self.tool_log_path();
        if let Some(parent) = log_path.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }

        let fetch = self
            .fetcher
            .fetch(&task.source_url, &scratch_dir, &log_path);
        match tokio::time::timeout(self.time_limit(), fetch).await {
            Ok(result) => result?,
            Err(_) => {
                tracing::warn!(
                    record_id = task.id.0,
                    time_limit_secs = self.time_limit().as_secs(),
                    "Download tool exceeded time limit"
                );
                return Ok(Outcome::TimedOut);
            }
        }

        // The tool must have produced exactly one file. Zero means the fetch
        // failed; more than one means we cannot tell which is the artifact.
        let mut entries = tokio::fs::read_dir(&scratch_dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name());
        }
        let filename = match names.as_slice() {
            [] => return Err(TaskError::NoFileDownloaded.into()),
            [single] => single.to_string_lossy().into_owned(),
            many => {
                return Err(TaskError::AmbiguousResult { count: many.len() }.into());
            }
        };

        let file_path = scratch_dir.join(&filename);
        if !file_path.is_file() {
            return Err(TaskError::FileLost { path: file_path }.into());
        }

        self.store
            .post_file(
                &task.container,
                &file_path,
                &task.dest_path,
                &filename,
                &task.owner,
            )
            .await?;

        let size_bytes = tokio::fs::metadata(&file_path).await?.len();
        if let Err(e) = self.db.set_file_size(task.id, size_bytes).await {
            tracing::warn!(record_id = task.id.0, error = %e, "Failed to persist file size");
        }

        // dest_path names a directory; record where the artifact actually
        // landed.
        let separator = if task.dest_path.ends_with('/') { "" } else { "/" };
        let final_path = format!("{}{}{}", task.dest_path, separator, filename);
        if let Err(e) = self.db.set_final_path(task.id, &final_path).await {
            tracing::warn!(record_id = task.id.0, error = %e, "Failed to persist final path");
        }

        Ok(Outcome::Completed { size_bytes })
    }

    /// Best-effort scratch cleanup: failures are logged, never escalated
    async fn cleanup_scratch(&self, id: RecordId, dir: &Path) {
        if let Err(e) = tokio::fs::remove_dir_all(dir).await {
            tracing::warn!(
                record_id = id.0,
                scratch = %dir.display(),
                error = %e,
                "Failed to remove scratch directory"
            );
        }
    }
}

#[async_trait]
impl TaskProcessor for DownloadExecutor {
    async fn process(&self, task: DownloadTask) -> crate::Result<()> {
        self.set_status_logged(task.id, Status::Downloading).await;
        self.emit(Event::TaskStarted { id: task.id });

        let mut scratch: Option<PathBuf> = None;
        match self.run(&task, &mut scratch).await {
            Ok(Outcome::Completed { size_bytes }) => {
                self.set_status_logged(task.id, Status::Ok).await;
                tracing::info!(record_id = task.id.0, size_bytes, "Offline download completed");
                self.emit(Event::TaskCompleted {
                    id: task.id,
                    size_bytes,
                });
            }
            Ok(Outcome::TimedOut) => {
                self.set_status_logged(task.id, Status::Tle).await;
                self.emit(Event::TaskTimedOut { id: task.id });
            }
            Err(e) => {
                tracing::warn!(
                    record_id = task.id.0,
                    error = %e,
                    "Failed to do offline download"
                );
                let detail = format!("Download worker error: {}", e);
                if let Err(db_err) = self
                    .db
                    .set_status_with_detail(task.id, Status::Error, &detail)
                    .await
                {
                    tracing::warn!(record_id = task.id.0, error = %db_err, "Failed to persist failure");
                }
                self.emit(Event::TaskFailed {
                    id: task.id,
                    detail,
                });
            }
        }

        // Cleanup always runs, including after a timeout: partial data is
        // discarded and resumption only spans process restarts.
        if let Some(dir) = scratch {
            self.cleanup_scratch(task.id, &dir).await;
        }

        Ok(())
    }
}
