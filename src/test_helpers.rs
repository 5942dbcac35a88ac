//! Shared test doubles for the fetcher and file store seams.

use std::path::Path;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::fetcher::UrlFetcher;
use crate::store::FileStore;

/// Mock fetcher writing a fixed set of files into the scratch directory,
/// optionally sleeping first (to exercise the time limit)
pub(crate) struct ScriptedFetcher {
    pub(crate) files: Vec<(&'static str, &'static [u8])>,
    pub(crate) sleep: Option<Duration>,
}

#[async_trait]
impl UrlFetcher for ScriptedFetcher {
    async fn fetch(&self, _url: &str, scratch_dir: &Path, _log: &Path) -> crate::Result<()> {
        if let Some(sleep) = self.sleep {
            tokio::time::sleep(sleep).await;
        }
        for (name, contents) in &self.files {
            tokio::fs::write(scratch_dir.join(name), contents).await?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Store recording every commit it receives as
/// `(container, dest_dir, filename, owner)`
#[derive(Default)]
pub(crate) struct RecordingStore {
    pub(crate) commits: StdMutex<Vec<(String, String, String, String)>>,
}

#[async_trait]
impl FileStore for RecordingStore {
    async fn post_file(
        &self,
        container: &str,
        _source_path: &Path,
        dest_dir: &str,
        filename: &str,
        owner: &str,
    ) -> crate::Result<()> {
        self.commits.lock().unwrap().push((
            container.to_string(),
            dest_dir.to_string(),
            filename.to_string(),
            owner.to_string(),
        ));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
