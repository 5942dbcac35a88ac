//! Trait definition for pluggable download tools.

use async_trait::async_trait;
use std::path::Path;

/// Interface for one fetch attempt into a scratch directory
///
/// Implementations download `url` into `scratch_dir`, appending any tool
/// output to `log_file`. The caller enforces the wall-clock time limit by
/// dropping the future; an implementation that spawns a child process must
/// therefore arrange for the child to be killed on drop (the provided
/// [`Aria2cFetcher`](super::Aria2cFetcher) uses `kill_on_drop`).
///
/// A fetch that completes without error makes no promise about the result:
/// the executor validates the scratch directory contents afterwards. A tool
/// exiting nonzero is logged but is not an error here — a failed fetch leaves
/// an empty scratch directory and surfaces as "no file downloaded".
#[async_trait]
pub trait UrlFetcher: Send + Sync {
    /// Fetch `url` into `scratch_dir`
    async fn fetch(&self, url: &str, scratch_dir: &Path, log_file: &Path) -> crate::Result<()>;

    /// Implementation name for logging
    fn name(&self) -> &'static str;
}
