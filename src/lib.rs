//! # offline-dl
//!
//! Durable background job runner that fetches remote resources (by URL) into
//! a managed file store on behalf of users of a file-sync service.
//!
//! ## Design Philosophy
//!
//! - **Durable first** - every job lives in SQLite; the in-memory queue is
//!   only a dispatch buffer and a crash never loses or duplicates a job
//! - **Delegated transport** - the download protocol belongs to an external
//!   tool (aria2c by default); this crate owns scheduling, state, and cleanup
//! - **Library-first** - no CLI or UI, purely a Rust crate for embedding
//! - **Pluggable seams** - the download tool and the file-store commit API
//!   are traits, so hosts and tests substitute their own
//!
//! ## Quick Start
//!
//! ```no_run
//! use offline_dl::{Config, LocalFileStore, OfflineDownloader, run_with_shutdown};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let store = Arc::new(LocalFileStore::new("./store".into()));
//!
//!     let downloader = OfflineDownloader::new(config, store).await?;
//!     downloader.start().await;
//!
//!     // Create a job; a worker picks it up on the next dispatch cycle
//!     downloader
//!         .add_url("repo-1", "/incoming", "http://example.com/a.bin", "alice")
//!         .await?;
//!
//!     // Run until SIGTERM/SIGINT
//!     run_with_shutdown(downloader).await;
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Periodic dispatch and startup recovery
pub mod dispatcher;
/// Error types
pub mod error;
/// Per-task download execution
pub mod executor;
/// External download tool handling
pub mod fetcher;
/// The downloader facade
pub mod manager;
/// Worker pool
pub mod pool;
/// File store commit interface
pub mod store;
/// Core types and events
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::Config;
pub use db::{Database, DownloadRecord, NewDownloadRecord};
pub use error::{DatabaseError, Error, Result, TaskError};
pub use fetcher::{Aria2cFetcher, UrlFetcher};
pub use manager::OfflineDownloader;
pub use store::{FileStore, LocalFileStore};
pub use types::{DownloadTask, Event, RecordId, Status};

/// Helper function to run the downloader with graceful signal handling.
///
/// Waits for a termination signal and then calls the downloader's
/// `shutdown()` method.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal
///   registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
pub async fn run_with_shutdown(downloader: OfflineDownloader) {
    wait_for_signal().await;
    downloader.shutdown().await;
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments (containers, tests);
    // fall back to the portable ctrl_c handler in that case.
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
                _ = sigint.recv() => tracing::info!("Received SIGINT"),
            }
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(error = %e, "SIGINT handler unavailable, waiting for SIGTERM only");
            sigterm.recv().await;
            tracing::info!("Received SIGTERM");
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, waiting for SIGINT only");
            sigint.recv().await;
            tracing::info!("Received SIGINT");
        }
        (Err(e), Err(_)) => {
            tracing::warn!(error = %e, "No unix signal handlers available, falling back to ctrl_c");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}
