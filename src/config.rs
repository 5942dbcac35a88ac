//! Configuration types for offline-dl

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Hard bounds applied to `max_workers` during normalization
pub const MIN_WORKERS: usize = 1;
/// Upper bound for `max_workers`
pub const MAX_WORKERS: usize = 5;
/// Minimum accepted time limit for one external tool invocation
pub const MIN_TIME_LIMIT: Duration = Duration::from_secs(30);

/// Main configuration for the offline downloader
///
/// All fields have serde defaults so a host can start from an empty JSON
/// object. Call [`Config::normalized`] before handing the config to
/// [`OfflineDownloader::new`](crate::OfflineDownloader::new) — construction
/// normalizes on its own, but doing it early makes the effective values
/// visible to the host.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Whether the offline download subsystem is enabled (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Worker behavior settings (concurrency, time limit, dispatch period)
    #[serde(flatten)]
    pub workers: WorkerConfig,

    /// External download tool settings
    #[serde(flatten)]
    pub tool: ToolConfig,

    /// Data storage locations
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            workers: WorkerConfig::default(),
            tool: ToolConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

/// Worker pool and dispatch behavior
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of pool workers (default: 2, clamped to 1-5 by normalization)
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Wall-clock limit for one external tool invocation
    /// (default: 30 minutes, floored at 30 seconds by normalization)
    #[serde(default = "default_time_limit", with = "duration_serde")]
    pub time_limit: Duration,

    /// Period of the dispatch loop (default: 5 seconds)
    #[serde(default = "default_dispatch_interval", with = "duration_serde")]
    pub dispatch_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            time_limit: default_time_limit(),
            dispatch_interval: default_dispatch_interval(),
        }
    }
}

/// External download tool settings
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Path to the download executable (auto-detected if None)
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Whether to search PATH for the executable if no explicit path is set
    /// (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Pass the tool's resume flag so partially fetched content in a reused
    /// scratch directory continues instead of restarting (default: true)
    #[serde(default = "default_true")]
    pub resume: bool,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            search_path: true,
            resume: true,
        }
    }
}

/// Data storage locations
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// SQLite database path (default: "./offline-dl.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Root under which per-task scratch directories are created
    /// (default: "./temp")
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Directory receiving the external tool's append-mode log file
    /// (default: "./logs")
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            temp_dir: default_temp_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("failed to read config file '{}': {}", path.display(), e),
            key: None,
        })?;
        let config: Config = serde_json::from_str(&contents)?;
        Ok(config.normalized())
    }

    /// Clamp out-of-range values to their documented bounds
    ///
    /// `max_workers` is clamped to 1-5 and `time_limit` is floored at 30
    /// seconds. Out-of-range inputs are logged rather than rejected so a
    /// misconfigured host degrades to sane behavior instead of failing to
    /// start.
    pub fn normalized(mut self) -> Self {
        let workers = self.workers.max_workers.clamp(MIN_WORKERS, MAX_WORKERS);
        if workers != self.workers.max_workers {
            tracing::warn!(
                configured = self.workers.max_workers,
                effective = workers,
                "max_workers out of range, clamping"
            );
            self.workers.max_workers = workers;
        }

        if self.workers.time_limit < MIN_TIME_LIMIT {
            tracing::warn!(
                configured_secs = self.workers.time_limit.as_secs(),
                effective_secs = MIN_TIME_LIMIT.as_secs(),
                "time_limit below minimum, flooring"
            );
            self.workers.time_limit = MIN_TIME_LIMIT;
        }

        self
    }
}

fn default_true() -> bool {
    true
}

fn default_max_workers() -> usize {
    2
}

fn default_time_limit() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_dispatch_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./offline-dl.db")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("./temp")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

// Duration serialization as seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
