//! `config.toml` loading.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::paths::Layout;

/// Where command symlinks land unless configured otherwise.
pub const DEFAULT_BIN_DIR: &str = "/usr/local/bin";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Runtime configuration for one scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory receiving command symlinks.
    pub bin_dir: PathBuf,
    /// Interpreter overrides keyed by runner identifier.
    pub runners: BTreeMap<String, PathBuf>,
    pub network: NetworkConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bin_dir: PathBuf::from(DEFAULT_BIN_DIR),
            runners: BTreeMap::new(),
            network: NetworkConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: crate::USER_AGENT.to_string(),
        }
    }
}

impl Config {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the layout's `config.toml` and apply the `PAK_BIN_DIR` override.
    pub fn for_layout(layout: &Layout) -> Result<Self, ConfigError> {
        let mut config = Self::load(&layout.config_file())?;
        if let Some(dir) = std::env::var_os("PAK_BIN_DIR") {
            config.bin_dir = PathBuf::from(dir);
        }
        Ok(config)
    }
}
