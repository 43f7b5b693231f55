//! Collector settings.
//!
//! A [`Config`] starts from the built-in defaults and is refined by
//! [`ConfigLayer`]s: an optional JSON file, the process environment and the
//! command line, in that order. The resolved value is handed to each step
//! explicitly; nothing reads the environment after startup.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_FEED_URL: &str =
    "https://proxy.transport.data.gouv.fr/resource/sncf-gtfs-rt-service-alerts";
pub const DEFAULT_ARCHIVE_DIR: &str = "archives_gtfs_rt_sa";
pub const DEFAULT_FILE_PREFIX: &str = "gtfs_rt_sa";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_FEED_URL: &str = "GTFS_RT_SA_URL";
pub const ENV_ARCHIVE_DIR: &str = "ARCHIVE_DIR";
pub const ENV_TIMEOUT_SECS: &str = "FETCH_TIMEOUT_SECS";
pub const ENV_FILE_PREFIX: &str = "FILE_PREFIX";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub feed_url: String,
    pub archive_dir: PathBuf,
    pub timeout: Duration,
    pub file_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            archive_dir: PathBuf::from(DEFAULT_ARCHIVE_DIR),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
        }
    }
}

/// A partial set of settings. Unset fields leave the underlying value alone.
///
/// Stored on disk as a JSON object:
/// ```json
/// {
///   "feed_url": "https://example.org/alerts.pb",
///   "archive_dir": "/var/lib/alerts",
///   "timeout_secs": 10,
///   "file_prefix": "sncf_sa"
/// }
/// ```
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub feed_url: Option<String>,
    pub archive_dir: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub file_prefix: Option<String>,
}

impl ConfigLayer {
    /// Loads a layer from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds a layer from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Builds a layer from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let timeout_secs = match lookup(ENV_TIMEOUT_SECS) {
            Some(value) => Some(value.trim().parse::<u64>().map_err(|_| {
                ConfigError::InvalidEnv {
                    var: ENV_TIMEOUT_SECS,
                    value,
                }
            })?),
            None => None,
        };

        Ok(Self {
            feed_url: lookup(ENV_FEED_URL),
            archive_dir: lookup(ENV_ARCHIVE_DIR).map(PathBuf::from),
            timeout_secs,
            file_prefix: lookup(ENV_FILE_PREFIX),
        })
    }
}

impl Config {
    /// Applies `layer` on top of `self`.
    pub fn merge(mut self, layer: ConfigLayer) -> Self {
        if let Some(url) = layer.feed_url {
            self.feed_url = url;
        }
        if let Some(dir) = layer.archive_dir {
            self.archive_dir = dir;
        }
        if let Some(secs) = layer.timeout_secs {
            self.timeout = Duration::from_secs(secs);
        }
        if let Some(prefix) = layer.file_prefix {
            self.file_prefix = prefix;
        }
        self
    }
}
