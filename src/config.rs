//! Cluster configuration from `cql.toml`.
//!
//! ```toml
//! [cluster]
//! hosts = ["10.0.0.1", "10.0.0.2:9161"]
//! keyspace = "app"
//! user = "app"
//! password = "secret"
//! timeout_ms = 4000
//! use_bigints = true
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::error::{CqlError, CqlResult};
use crate::pool::PoolConfig;

pub const CONFIG_FILE: &str = "cql.toml";

#[derive(Debug, Deserialize)]
struct ConfigFile {
    cluster: ClusterConfig,
}

/// The `[cluster]` table.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClusterConfig {
    pub hosts: Vec<String>,
    pub keyspace: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub max_size: Option<usize>,
    pub idle_timeout_ms: Option<u64>,
    pub timeout_ms: Option<u64>,
    pub stale_threshold_ms: Option<u64>,
    pub max_attempts: Option<usize>,
    pub use_bigints: bool,
    pub log_time: bool,
}

impl ClusterConfig {
    pub fn from_toml(content: &str) -> CqlResult<Self> {
        let file: ConfigFile = toml::from_str(content)
            .map_err(|e| CqlError::Config(format!("invalid {}: {}", CONFIG_FILE, e)))?;
        Ok(file.cluster)
    }

    pub fn load(path: impl AsRef<Path>) -> CqlResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        debug!(path = %path.display(), "loaded cluster config");
        Self::from_toml(&content)
    }

    /// First `cql.toml` found in [`config_paths`], if any.
    pub fn discover() -> CqlResult<Option<(PathBuf, Self)>> {
        for path in config_paths() {
            if path.is_file() {
                let config = Self::load(&path)?;
                return Ok(Some((path, config)));
            }
        }
        Ok(None)
    }

    pub fn into_pool_config(self) -> CqlResult<PoolConfig> {
        if self.hosts.is_empty() {
            return Err(CqlError::Config("no hosts configured".into()));
        }
        if self.keyspace.is_empty() {
            return Err(CqlError::Config("no keyspace configured".into()));
        }

        let mut config = PoolConfig::new(self.hosts, self.keyspace)
            .use_bigints(self.use_bigints)
            .log_time(self.log_time);

        if self.user.is_some() || self.password.is_some() {
            config = config.credentials(
                self.user.unwrap_or_default(),
                self.password.unwrap_or_default(),
            );
        }
        if let Some(max) = self.max_size {
            config = config.max_size(max);
        }
        if let Some(ms) = self.idle_timeout_ms {
            config = config.idle_timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.timeout_ms {
            config = config.timeout(Duration::from_millis(ms));
        }
        if let Some(ms) = self.stale_threshold_ms {
            config = config.stale_threshold(Duration::from_millis(ms));
        }
        if let Some(n) = self.max_attempts {
            config = config.max_attempts(n);
        }
        Ok(config)
    }
}

/// Working directory first, then the user config dir (`~/.config/cql/`).
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from(CONFIG_FILE)];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("cql").join(CONFIG_FILE));
    }
    paths
}
