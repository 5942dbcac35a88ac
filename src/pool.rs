//! Fixed-size worker pool draining a shared FIFO task queue.
//!
//! The queue is unbounded by design: backpressure is a non-goal because the
//! durable record table is the true backlog and the in-memory queue only
//! buffers one dispatch cycle. `submit` therefore never blocks and never
//! rejects.
//!
//! Shutdown uses a poison-pill protocol: exactly one `Shutdown` sentinel per
//! worker is enqueued behind any remaining tasks, so every worker terminates
//! exactly once after the queue drains.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use crate::types::DownloadTask;

/// Task-processing function the pool is generic over
///
/// Implementations must contain their own failures; an `Err` returned here is
/// the pool's second safety net and is logged without killing the worker.
#[async_trait]
pub trait TaskProcessor: Send + Sync {
    /// Process one task to completion
    async fn process(&self, task: DownloadTask) -> crate::Result<()>;
}

enum PoolMessage {
    Task(DownloadTask),
    Shutdown,
}

/// Fixed-size pool of long-lived workers
///
/// Completion is observed only through persisted state changes made by the
/// processor, never through the pool itself.
pub struct WorkerPool {
    tx: mpsc::UnboundedSender<PoolMessage>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    nworkers: usize,
}

impl WorkerPool {
    /// Start `nworkers` workers processing tasks with `processor`
    pub fn start(nworkers: usize, processor: Arc<dyn TaskProcessor>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(Mutex::new(rx));

        let mut workers = Vec::with_capacity(nworkers);
        for worker_id in 0..nworkers {
            let rx = Arc::clone(&rx);
            let processor = Arc::clone(&processor);
            workers.push(tokio::spawn(async move {
                Self::worker_loop(worker_id, rx, processor).await;
            }));
        }

        Self {
            tx,
            workers: Mutex::new(workers),
            nworkers,
        }
    }

    async fn worker_loop(
        worker_id: usize,
        rx: Arc<Mutex<mpsc::UnboundedReceiver<PoolMessage>>>,
        processor: Arc<dyn TaskProcessor>,
    ) {
        tracing::debug!(worker_id, "Worker started");
        loop {
            // Hold the receiver lock only for the dequeue; processing runs
            // with the lock released so workers execute tasks concurrently.
            let message = {
                let mut rx = rx.lock().await;
                rx.recv().await
            };

            match message {
                Some(PoolMessage::Task(task)) => {
                    let id = task.id;
                    if let Err(e) = processor.process(task).await {
                        // The worker must never die from a single task's
                        // failure.
                        tracing::warn!(
                            worker_id,
                            record_id = id.0,
                            error = %e,
                            "Task processing failed"
                        );
                    }
                }
                Some(PoolMessage::Shutdown) | None => break,
            }
        }
        tracing::debug!(worker_id, "Worker stopped");
    }

    /// Enqueue a task
    ///
    /// Non-blocking; the queue is unbounded. After `shutdown` the task is
    /// dropped with a warning — the durable record keeps it recoverable on
    /// the next start.
    pub fn submit(&self, task: DownloadTask) {
        let id = task.id;
        if self.tx.send(PoolMessage::Task(task)).is_err() {
            tracing::warn!(record_id = id.0, "Worker pool is shut down, dropping task");
        }
    }

    /// Number of workers in the pool
    pub fn worker_count(&self) -> usize {
        self.nworkers
    }

    /// Shut the pool down and wait for every worker to exit
    ///
    /// Enqueues exactly one sentinel per worker behind any queued tasks, so
    /// remaining work drains first and each worker terminates exactly once.
    pub async fn shutdown(&self) {
        for _ in 0..self.nworkers {
            if self.tx.send(PoolMessage::Shutdown).is_err() {
                break;
            }
        }

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Worker task ended abnormally");
            }
        }
    }
}
