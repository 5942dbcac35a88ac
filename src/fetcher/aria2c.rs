//! CLI-based fetcher using the external aria2c binary

use super::traits::UrlFetcher;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// CLI-based fetcher using the external `aria2c` binary
///
/// Invokes `aria2c [-c] --dir <scratch_dir> <url>` with stdout and stderr
/// appended to the task log file. The `-c` flag makes aria2c continue a
/// partially fetched file found in the scratch directory, which is what makes
/// scratch-directory reuse across restarts worthwhile.
///
/// # Examples
///
/// ```no_run
/// use offline_dl::fetcher::Aria2cFetcher;
/// use std::path::PathBuf;
///
/// // Create with explicit path
/// let fetcher = Aria2cFetcher::new(PathBuf::from("/usr/bin/aria2c"), true);
///
/// // Or auto-discover from PATH
/// let fetcher = Aria2cFetcher::from_path(true)
///     .expect("aria2c not found in PATH");
/// ```
pub struct Aria2cFetcher {
    binary_path: PathBuf,
    resume: bool,
}

impl Aria2cFetcher {
    /// Create a new fetcher with an explicit binary path
    pub fn new(binary_path: PathBuf, resume: bool) -> Self {
        Self {
            binary_path,
            resume,
        }
    }

    /// Attempt to find aria2c in PATH
    ///
    /// Uses the `which` crate to search the system PATH.
    ///
    /// # Returns
    ///
    /// `Some(Aria2cFetcher)` if the binary is found, `None` otherwise.
    pub fn from_path(resume: bool) -> Option<Self> {
        which::which("aria2c").ok().map(|p| Self::new(p, resume))
    }
}

#[async_trait]
impl UrlFetcher for Aria2cFetcher {
    async fn fetch(&self, url: &str, scratch_dir: &Path, log_file: &Path) -> crate::Result<()> {
        let log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file)
            .await
            .map_err(|e| {
                crate::Error::ExternalTool(format!(
                    "Failed to open log file '{}': {}",
                    log_file.display(),
                    e
                ))
            })?
            .into_std()
            .await;
        let log_err = log.try_clone().map_err(|e| {
            crate::Error::ExternalTool(format!("Failed to clone log handle: {}", e))
        })?;

        let mut cmd = Command::new(&self.binary_path);
        if self.resume {
            cmd.arg("-c");
        }
        cmd.arg("--dir")
            .arg(scratch_dir)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(log_err))
            // The executor enforces the time limit by dropping this future;
            // the child must not outlive it.
            .kill_on_drop(true);

        tracing::debug!(
            url,
            scratch_dir = %scratch_dir.display(),
            "Executing: {} {}--dir {} {}",
            self.binary_path.display(),
            if self.resume { "-c " } else { "" },
            scratch_dir.display(),
            url
        );

        let status = cmd.spawn().map_err(|e| {
            crate::Error::ExternalTool(format!(
                "Failed to execute {}: {}",
                self.binary_path.display(),
                e
            ))
        })?
        .wait()
        .await
        .map_err(|e| {
            crate::Error::ExternalTool(format!(
                "Failed to wait for {}: {}",
                self.binary_path.display(),
                e
            ))
        })?;

        if !status.success() {
            // Not an error: the tool's failure shows up as an empty scratch
            // directory and fails validation downstream.
            tracing::warn!(url, %status, "Download tool exited with failure status");
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "cli-aria2c"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_path_returns_none_for_missing_binary() {
        let result = which::which("nonexistent-aria2c-binary-xyz");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_path_binary_discovery() {
        // from_path() must agree with a direct which() lookup, whether or
        // not aria2c is actually installed on the test machine.
        let which_result = which::which("aria2c");
        let from_path_result = Aria2cFetcher::from_path(true);

        match which_result {
            Ok(expected_path) => {
                let fetcher = from_path_result.expect("from_path() should find aria2c");
                assert_eq!(fetcher.binary_path, expected_path);
            }
            Err(_) => {
                assert!(from_path_result.is_none());
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_with_missing_binary_is_external_tool_error() {
        let temp = tempfile::tempdir().unwrap();
        let fetcher = Aria2cFetcher::new(temp.path().join("no-such-binary"), false);

        let err = fetcher
            .fetch(
                "http://example.com/a.bin",
                temp.path(),
                &temp.path().join("tool.log"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, crate::Error::ExternalTool(_)));
    }
}
