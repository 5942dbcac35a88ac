//! The `OfflineDownloader` facade: construction, startup recovery, the
//! dispatch loop, and graceful shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::db::{Database, NewDownloadRecord};
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::executor::DownloadExecutor;
use crate::fetcher::{Aria2cFetcher, UrlFetcher};
use crate::pool::WorkerPool;
use crate::store::FileStore;
use crate::types::{Event, RecordId};

/// Buffer size of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// The offline download subsystem
///
/// Owns the worker pool, the dispatch loop, and the persistence handle. A
/// host embeds one instance, calls [`start`](Self::start) from its startup
/// sequence, creates records through [`add_url`](Self::add_url) (or directly
/// via [`Database::insert_record`] from its own ingestion path), and calls
/// [`shutdown`](Self::shutdown) on termination.
pub struct OfflineDownloader {
    /// Database instance for persistence
    /// Public for hosts that ingest records through their own event path
    pub db: Arc<Database>,
    config: Arc<Config>,
    pool: Arc<WorkerPool>,
    event_tx: broadcast::Sender<Event>,
    dispatcher_cancel: CancellationToken,
    dispatcher_handle: Mutex<Option<JoinHandle<()>>>,
    accepting_new: AtomicBool,
}

impl OfflineDownloader {
    /// Create a new downloader resolving the external tool from configuration
    ///
    /// Normalizes the config, creates the temp and log directories, opens the
    /// database and resolves the `aria2c` binary (explicit `binary_path`
    /// first, then a PATH search when `search_path` is set). Any failure here
    /// is a startup-time configuration problem: the whole subsystem stays
    /// disabled rather than partially running.
    pub async fn new(config: Config, store: Arc<dyn FileStore>) -> Result<Self> {
        let config = config.normalized();

        let fetcher: Arc<dyn UrlFetcher> = if let Some(ref path) = config.tool.binary_path {
            Arc::new(Aria2cFetcher::new(path.clone(), config.tool.resume))
        } else if config.tool.search_path {
            Aria2cFetcher::from_path(config.tool.resume)
                .map(|f| Arc::new(f) as Arc<dyn UrlFetcher>)
                .ok_or_else(|| {
                    Error::ExternalTool("aria2c not found in PATH".to_string())
                })?
        } else {
            return Err(Error::Config {
                message: "no download tool configured and PATH search is disabled".to_string(),
                key: Some("binary_path".to_string()),
            });
        };

        Self::with_fetcher(config, fetcher, store).await
    }

    /// Create a new downloader with an explicit [`UrlFetcher`] implementation
    ///
    /// For hosts that bring their own download tool, and for tests.
    pub async fn with_fetcher(
        config: Config,
        fetcher: Arc<dyn UrlFetcher>,
        store: Arc<dyn FileStore>,
    ) -> Result<Self> {
        let config = config.normalized();

        if !config.enabled {
            return Err(Error::Config {
                message: "offline download subsystem is disabled".to_string(),
                key: Some("enabled".to_string()),
            });
        }

        for dir in [&config.persistence.temp_dir, &config.persistence.log_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!("Failed to create directory '{}': {}", dir.display(), e),
                ))
            })?;
        }

        let db = Arc::new(Database::new(&config.persistence.database_path).await?);
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let config = Arc::new(config);

        tracing::info!(
            workers = config.workers.max_workers,
            time_limit_secs = config.workers.time_limit.as_secs(),
            fetcher = fetcher.name(),
            store = store.name(),
            "Offline downloader initialized"
        );

        let executor = Arc::new(DownloadExecutor::new(
            db.clone(),
            fetcher,
            store,
            config.clone(),
            event_tx.clone(),
        ));
        let pool = Arc::new(WorkerPool::start(config.workers.max_workers, executor));

        Ok(Self {
            db,
            config,
            pool,
            event_tx,
            dispatcher_cancel: CancellationToken::new(),
            dispatcher_handle: Mutex::new(None),
            accepting_new: AtomicBool::new(true),
        })
    }

    /// Run startup recovery, then spawn the periodic dispatch loop
    pub async fn start(&self) {
        let dispatcher = Dispatcher::new(
            self.db.clone(),
            self.pool.clone(),
            self.event_tx.clone(),
            self.config.workers.dispatch_interval,
        );

        // Interrupted work goes back into the queue before the first tick
        dispatcher.recover().await;

        let cancel = self.dispatcher_cancel.clone();
        let handle = tokio::spawn(dispatcher.run(cancel));
        *self.dispatcher_handle.lock().await = Some(handle);
    }

    /// Gracefully shut down the downloader
    ///
    /// Stops accepting new records, cancels the dispatch loop, drains the
    /// worker pool via its poison-pill protocol, and closes the database.
    /// Tasks past the tool invocation run to completion; anything still
    /// queued is dropped and recovered from its durable record on next start.
    pub async fn shutdown(&self) {
        tracing::info!("Initiating graceful shutdown");
        self.accepting_new.store(false, Ordering::SeqCst);

        self.dispatcher_cancel.cancel();
        if let Some(handle) = self.dispatcher_handle.lock().await.take()
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "Dispatch loop ended abnormally");
        }

        self.pool.shutdown().await;
        self.event_tx.send(Event::Shutdown).ok();
        self.db.close().await;
        tracing::info!("Graceful shutdown complete");
    }

    /// Create a WAITING record for `url`
    ///
    /// The dispatcher claims it on the next cycle. Returns the new record id.
    pub async fn add_url(
        &self,
        container: &str,
        dest_path: &str,
        url: &str,
        owner: &str,
    ) -> Result<RecordId> {
        if !self.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        url::Url::parse(url).map_err(|e| Error::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let id = self
            .db
            .insert_record(&NewDownloadRecord {
                container: container.to_string(),
                dest_path: dest_path.to_string(),
                source_url: url.to_string(),
                owner: owner.to_string(),
            })
            .await?;

        tracing::info!(record_id = id.0, container, owner, "Offline download requested");
        Ok(id)
    }

    /// Subscribe to downloader events
    ///
    /// Multiple subscribers are supported; each receives all events
    /// independently. A subscriber that falls behind by more than the channel
    /// capacity receives a `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the effective (normalized) configuration
    pub fn get_config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{RecordingStore, ScriptedFetcher};
    use crate::types::Status;
    use std::time::Duration;

    fn test_config(temp: &tempfile::TempDir) -> Config {
        let mut config = Config::default();
        config.persistence.database_path = temp.path().join("test.db");
        config.persistence.temp_dir = temp.path().join("temp");
        config.persistence.log_dir = temp.path().join("logs");
        config.workers.dispatch_interval = Duration::from_millis(20);
        config
    }

    #[tokio::test]
    async fn test_disabled_config_is_a_startup_error() {
        let temp = tempfile::tempdir().unwrap();
        let mut config = test_config(&temp);
        config.enabled = false;

        let result = OfflineDownloader::with_fetcher(
            config,
            Arc::new(ScriptedFetcher {
                files: vec![],
                sleep: None,
            }),
            Arc::new(RecordingStore::default()),
        )
        .await;

        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[tokio::test]
    async fn test_add_url_rejects_invalid_urls() {
        let temp = tempfile::tempdir().unwrap();
        let downloader = OfflineDownloader::with_fetcher(
            test_config(&temp),
            Arc::new(ScriptedFetcher {
                files: vec![],
                sleep: None,
            }),
            Arc::new(RecordingStore::default()),
        )
        .await
        .unwrap();

        let err = downloader
            .add_url("repo-1", "/incoming", "not a url", "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_add_url_after_shutdown_is_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let downloader = OfflineDownloader::with_fetcher(
            test_config(&temp),
            Arc::new(ScriptedFetcher {
                files: vec![],
                sleep: None,
            }),
            Arc::new(RecordingStore::default()),
        )
        .await
        .unwrap();

        downloader.shutdown().await;

        let err = downloader
            .add_url("repo-1", "/incoming", "http://example.com/a.bin", "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ShuttingDown));
    }

    #[tokio::test]
    async fn test_full_lifecycle_completes_a_record() {
        let temp = tempfile::tempdir().unwrap();
        let store = Arc::new(RecordingStore::default());
        let downloader = OfflineDownloader::with_fetcher(
            test_config(&temp),
            Arc::new(ScriptedFetcher {
                files: vec![("a.bin", &b"payload"[..])],
                sleep: None,
            }),
            store.clone(),
        )
        .await
        .unwrap();

        let mut events = downloader.subscribe();
        let id = downloader
            .add_url("repo-1", "/incoming", "http://example.com/a.bin", "alice")
            .await
            .unwrap();

        downloader.start().await;

        // Wait for the record to reach a terminal state
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let record = downloader.db.get_record(id).await.unwrap().unwrap();
            if Status::from_i32(record.status).is_terminal() {
                assert_eq!(record.status, Status::Ok.to_i32());
                assert_eq!(record.size_bytes, 7);
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "record never completed");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        downloader.shutdown().await;
        assert_eq!(store.commits.lock().unwrap().len(), 1);

        // Queued, started, and completed events all observed
        let mut saw_completed = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event, Event::TaskCompleted { .. }) {
                saw_completed = true;
            }
        }
        assert!(saw_completed);
    }
}
