//! File store commit interface
//!
//! Committing a fetched file into the managed store belongs to the host
//! service. The [`FileStore`] trait is the seam: production hosts implement
//! it against their storage API, and [`LocalFileStore`] provides a plain
//! directory-tree implementation for local setups and tests.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Commit API of the managed file store
///
/// Assumed atomic per call: a returned `Ok` means the file is durably placed,
/// and conflicts fail loudly with an error rather than silently overwriting.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Commit `source_path` into `container` at `dest_dir`/`filename`,
    /// attributed to `owner`
    async fn post_file(
        &self,
        container: &str,
        source_path: &Path,
        dest_dir: &str,
        filename: &str,
        owner: &str,
    ) -> crate::Result<()>;

    /// Implementation name for logging
    fn name(&self) -> &'static str;
}

/// Directory-tree file store
///
/// Lays containers out as directories under a root:
/// `<root>/<container>/<dest_dir>/<filename>`. Attribution is log-only.
pub struct LocalFileStore {
    root: PathBuf,
}

impl LocalFileStore {
    /// Create a store rooted at `root`
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn dest(&self, container: &str, dest_dir: &str, filename: &str) -> PathBuf {
        self.root
            .join(container)
            .join(dest_dir.trim_start_matches('/'))
            .join(filename)
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn post_file(
        &self,
        container: &str,
        source_path: &Path,
        dest_dir: &str,
        filename: &str,
        owner: &str,
    ) -> crate::Result<()> {
        let dest = self.dest(container, dest_dir, filename);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                crate::Error::FileStore(format!(
                    "Failed to create destination '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
            return Err(crate::Error::FileStore(format!(
                "Destination already exists: {}",
                dest.display()
            )));
        }

        tokio::fs::copy(source_path, &dest).await.map_err(|e| {
            crate::Error::FileStore(format!(
                "Failed to commit '{}' to '{}': {}",
                source_path.display(),
                dest.display(),
                e
            ))
        })?;

        tracing::debug!(container, owner, dest = %dest.display(), "Committed file to local store");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "local-fs"
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_post_file_places_and_refuses_overwrite() {
        let temp = tempfile::tempdir().unwrap();
        let store = LocalFileStore::new(temp.path().join("store"));

        let source = temp.path().join("a.bin");
        tokio::fs::write(&source, b"payload").await.unwrap();

        store
            .post_file("repo-1", &source, "/incoming", "a.bin", "alice")
            .await
            .unwrap();

        let committed = temp.path().join("store/repo-1/incoming/a.bin");
        assert_eq!(tokio::fs::read(&committed).await.unwrap(), b"payload");

        // Conflicts fail loudly
        let err = store
            .post_file("repo-1", &source, "/incoming", "a.bin", "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::FileStore(_)));
    }
}
