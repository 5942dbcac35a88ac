//! Periodic dispatch and startup recovery.
//!
//! Two triggers feed the worker pool. Startup recovery runs once and
//! resubmits work interrupted by a crash: records stuck in DOWNLOADING first
//! (in-progress work resumes before work that never started), then records
//! stuck in QUEUING. Steady-state dispatch then runs on a fixed period,
//! claiming WAITING records (`Waiting → Queuing`) strictly before enqueueing
//! them — the claim is what keeps the next cycle's read from picking the same
//! record up again.
//!
//! Persistence failures never crash the loop: a failed query means "no work
//! found this cycle" and the next tick retries.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::db::{Database, DownloadRecord};
use crate::pool::WorkerPool;
use crate::types::{DownloadTask, Event, RecordId, Status};

/// Claims dispatchable records and feeds them to the worker pool
pub struct Dispatcher {
    db: Arc<Database>,
    pool: Arc<WorkerPool>,
    event_tx: broadcast::Sender<Event>,
    interval: Duration,
}

fn task_from_record(record: &DownloadRecord) -> DownloadTask {
    DownloadTask {
        id: RecordId(record.id),
        container: record.container.clone(),
        dest_path: record.dest_path.clone(),
        source_url: record.source_url.clone(),
        owner: record.owner.clone(),
    }
}

impl Dispatcher {
    /// Create a dispatcher over the given pool
    pub fn new(
        db: Arc<Database>,
        pool: Arc<WorkerPool>,
        event_tx: broadcast::Sender<Event>,
        interval: Duration,
    ) -> Self {
        Self {
            db,
            pool,
            event_tx,
            interval,
        }
    }

    /// One-time startup recovery
    ///
    /// Resubmits interrupted tasks without changing their status: a
    /// DOWNLOADING record is simply re-observed by the worker that picks it
    /// up, a QUEUING record was claimed before the crash and keeps its claim.
    pub async fn recover(&self) {
        tracing::info!("Recovering interrupted offline downloads");

        let mut recovered = 0usize;
        for status in [Status::Downloading, Status::Queuing] {
            match self.db.list_by_status(status).await {
                Ok(records) => {
                    for record in &records {
                        tracing::info!(record_id = record.id, %status, "Resubmitting interrupted task");
                        self.pool.submit(task_from_record(record));
                        recovered += 1;
                    }
                }
                Err(e) => {
                    // Leave the records alone; the next restart retries.
                    tracing::warn!(%status, error = %e, "Failed to query interrupted tasks");
                }
            }
        }

        if recovered > 0 {
            tracing::info!(recovered, "Startup recovery complete");
        } else {
            tracing::debug!("No interrupted tasks to recover");
        }
    }

    /// One dispatch cycle: claim every WAITING record, then enqueue it
    ///
    /// The claim (`Waiting → Queuing`) is persisted before the enqueue so a
    /// record is handed to the pool at most once per claim. A record whose
    /// claim fails is skipped and stays WAITING for the next cycle.
    pub async fn dispatch_once(&self) {
        let records = match self.db.list_by_status(Status::Waiting).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to query waiting tasks, skipping cycle");
                return;
            }
        };

        for record in &records {
            let id = RecordId(record.id);
            if let Err(e) = self.db.set_status(id, Status::Queuing).await {
                tracing::warn!(record_id = record.id, error = %e, "Failed to claim record, skipping");
                continue;
            }
            self.pool.submit(task_from_record(record));
            self.event_tx.send(Event::TaskQueued { id }).ok();
        }
    }

    /// Run the periodic dispatch loop until `cancel` fires
    ///
    /// Cancellation is cooperative: the loop exits from its wait interval,
    /// never in the middle of a cycle.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.interval.as_secs(),
            "Dispatch loop started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {
                    self.dispatch_once().await;
                }
            }
        }

        tracing::info!("Dispatch loop stopped");
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewDownloadRecord;
    use crate::pool::TaskProcessor;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Processor that records the ids it sees, in order
    #[derive(Default)]
    struct RecordingProcessor {
        seen: StdMutex<Vec<i64>>,
    }

    #[async_trait]
    impl TaskProcessor for RecordingProcessor {
        async fn process(&self, task: DownloadTask) -> crate::Result<()> {
            self.seen.lock().unwrap().push(task.id.0);
            Ok(())
        }
    }

    async fn test_db() -> (Arc<Database>, tempfile::TempDir) {
        let temp = tempfile::tempdir().unwrap();
        let db = Database::new(&temp.path().join("test.db")).await.unwrap();
        (Arc::new(db), temp)
    }

    async fn insert(db: &Database, status: Status) -> RecordId {
        let id = db
            .insert_record(&NewDownloadRecord {
                container: "repo-1".into(),
                dest_path: "/incoming".into(),
                source_url: "http://example.com/a.bin".into(),
                owner: "alice".into(),
            })
            .await
            .unwrap();
        if status != Status::Waiting {
            db.set_status(id, status).await.unwrap();
        }
        id
    }

    #[tokio::test]
    async fn test_dispatch_claims_before_enqueue_and_only_once() {
        let (db, _temp) = test_db().await;
        let processor = Arc::new(RecordingProcessor::default());
        let pool = Arc::new(WorkerPool::start(1, processor.clone()));
        let (event_tx, _rx) = broadcast::channel(16);

        let a = insert(&db, Status::Waiting).await;
        let b = insert(&db, Status::Waiting).await;

        let dispatcher = Dispatcher::new(db.clone(), pool.clone(), event_tx, Duration::from_secs(5));
        dispatcher.dispatch_once().await;

        // Both records are claimed; nothing is left WAITING
        assert!(db.list_by_status(Status::Waiting).await.unwrap().is_empty());

        // A second cycle finds nothing and enqueues nothing new
        dispatcher.dispatch_once().await;

        pool.shutdown().await;
        let mut seen = processor.seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![a.0, b.0]);
    }

    #[tokio::test]
    async fn test_recovery_resubmits_downloading_before_queuing() {
        let (db, _temp) = test_db().await;
        let processor = Arc::new(RecordingProcessor::default());
        let pool = Arc::new(WorkerPool::start(1, processor.clone()));
        let (event_tx, _rx) = broadcast::channel(16);

        let queued = insert(&db, Status::Queuing).await;
        let interrupted = insert(&db, Status::Downloading).await;
        // Terminal and waiting records are not recovery candidates
        insert(&db, Status::Ok).await;
        insert(&db, Status::Waiting).await;

        let dispatcher = Dispatcher::new(db.clone(), pool.clone(), event_tx, Duration::from_secs(5));
        dispatcher.recover().await;
        pool.shutdown().await;

        // Interrupted work resumes before never-started work, each exactly once
        let seen = processor.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![interrupted.0, queued.0]);
    }

    #[tokio::test]
    async fn test_dispatch_cycle_survives_gateway_failure() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("test.db");
        let db = Arc::new(Database::new(&db_path).await.unwrap());
        let processor = Arc::new(RecordingProcessor::default());
        let pool = Arc::new(WorkerPool::start(1, processor.clone()));
        let (event_tx, _rx) = broadcast::channel(16);

        let id = insert(&db, Status::Waiting).await;

        // A closed pool makes every query fail; the cycle must log, skip,
        // and leave the record untouched for the next tick.
        db.close().await;
        let dispatcher = Dispatcher::new(db, pool.clone(), event_tx, Duration::from_secs(5));
        dispatcher.dispatch_once().await;

        pool.shutdown().await;
        assert!(processor.seen.lock().unwrap().is_empty());

        // The record is still WAITING and dispatchable after a restart
        let db = Database::new(&db_path).await.unwrap();
        let record = db.get_record(id).await.unwrap().unwrap();
        assert_eq!(record.status, Status::Waiting.to_i32());
        db.close().await;
    }

    #[tokio::test]
    async fn test_run_exits_on_cancellation() {
        let (db, _temp) = test_db().await;
        let processor = Arc::new(RecordingProcessor::default());
        let pool = Arc::new(WorkerPool::start(1, processor));
        let (event_tx, _rx) = broadcast::channel(16);

        let dispatcher = Dispatcher::new(db, pool.clone(), event_tx, Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(dispatcher.run(cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("dispatch loop should exit on cancellation")
            .unwrap();

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_periodic_loop_dispatches_waiting_records() {
        let (db, _temp) = test_db().await;
        let processor = Arc::new(RecordingProcessor::default());
        let pool = Arc::new(WorkerPool::start(2, processor.clone()));
        let (event_tx, _rx) = broadcast::channel(16);

        let id = insert(&db, Status::Waiting).await;

        let dispatcher = Dispatcher::new(
            db.clone(),
            pool.clone(),
            event_tx,
            Duration::from_millis(20),
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(dispatcher.run(cancel.clone()));

        // Wait for the loop to tick at least once
        tokio::time::sleep(Duration::from_millis(200)).await;
        cancel.cancel();
        handle.await.unwrap();
        pool.shutdown().await;

        assert_eq!(processor.seen.lock().unwrap().as_slice(), &[id.0]);
    }
}
