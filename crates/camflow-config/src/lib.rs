//! CAMFlow configuration
//!
//! Finds a YAML settings file and turns it into the runtime configs of
//! the task queue and the reconciler.

pub mod error;

pub use error::*;

use camflow_sync::SyncConfig;
use camflow_sync::reconciler::{DEFAULT_CALL_TIMEOUT, DEFAULT_REGION_CONCURRENCY};
use camflow_task::QueueConfig;
use camflow_task::queue::{DEFAULT_QUEUE_CAPACITY, DEFAULT_TASK_TIMEOUT, DEFAULT_WORKER_COUNT};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Environment variable naming a config file directly
pub const CONFIG_PATH_ENV: &str = "CAMFLOW_CONFIG_PATH";

const CANDIDATES: [&str; 2] = ["camflow.local.yaml", "camflow.yaml"];

/// Locate the settings file
///
/// Search order:
/// 1. `CAMFLOW_CONFIG_PATH`
/// 2. current directory: `camflow.local.yaml`, `camflow.yaml`
/// 3. `./.camflow/`, same names
/// 4. `~/.config/camflow/config.yaml`
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        warn!(path = %path.display(), "{} points at a missing file", CONFIG_PATH_ENV);
    }

    let current_dir = std::env::current_dir()?;
    let project_dir = current_dir.join(".camflow");
    for dir in [&current_dir, &project_dir] {
        if let Some(path) = first_existing(dir) {
            return Ok(path);
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("camflow").join("config.yaml");
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

fn first_existing(dir: &Path) -> Option<PathBuf> {
    if !dir.is_dir() {
        return None;
    }
    CANDIDATES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub worker_count: usize,
    pub queue_capacity: usize,
    /// 0 disables the per-task timeout
    pub task_timeout_secs: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            task_timeout_secs: DEFAULT_TASK_TIMEOUT.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub region_concurrency: usize,
    /// 0 disables the per-call timeout
    pub call_timeout_secs: u64,
    pub default_asset_types: Vec<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            region_concurrency: DEFAULT_REGION_CONCURRENCY,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT.as_secs(),
            default_asset_types: SyncConfig::default().default_asset_types,
        }
    }
}

/// Contents of a settings file; absent keys keep their defaults
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub queue: QueueSettings,
    pub sync: SyncSettings,
}

impl Settings {
    /// Discover and load the settings file
    pub fn load() -> Result<Self> {
        let path = find_config_file()?;
        Self::load_from(&path)
    }

    /// Like [`Settings::load`], but a missing file yields the defaults
    pub fn load_or_default() -> Result<Self> {
        match Self::load() {
            Err(ConfigError::ConfigFileNotFound) => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: Self =
            serde_yaml::from_str(&content).map_err(|source| ConfigError::Yaml {
                path: path.to_path_buf(),
                source,
            })?;
        settings.validate()?;
        debug!(path = %path.display(), "loaded config");
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("queue.worker_count", self.queue.worker_count),
            ("queue.queue_capacity", self.queue.queue_capacity),
            ("sync.region_concurrency", self.sync.region_concurrency),
        ];
        for (key, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key,
                    reason: "must be at least 1".into(),
                });
            }
        }
        if let Some(blank) = self
            .sync
            .default_asset_types
            .iter()
            .find(|t| t.trim().is_empty())
        {
            return Err(ConfigError::InvalidValue {
                key: "sync.default_asset_types",
                reason: format!("blank asset type {blank:?}"),
            });
        }
        Ok(())
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig::new(self.queue.worker_count, self.queue.queue_capacity)
            .with_task_timeout(non_zero_secs(self.queue.task_timeout_secs))
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            region_concurrency: self.sync.region_concurrency,
            call_timeout: non_zero_secs(self.sync.call_timeout_secs),
            default_asset_types: self.sync.default_asset_types.clone(),
        }
    }
}

fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
