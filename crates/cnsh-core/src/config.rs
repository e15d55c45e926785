//! `cnsh.toml` configuration.
//!
//! Every field has a default, so the file is optional. Values are layered:
//! built-in defaults, then `cnsh.toml` in the working directory, then the
//! `CNSH_REGISTRY` environment variable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CnshError, Result};

/// Name of the optional per-project configuration file.
pub const CONFIG_FILE_NAME: &str = "cnsh.toml";

/// Environment variable overriding the registry URL.
pub const REGISTRY_ENV_VAR: &str = "CNSH_REGISTRY";

/// Default npm-compatible registry.
pub const DEFAULT_REGISTRY_URL: &str = "https://registry.npmjs.org";

/// Archives smaller than this are treated as truncated downloads.
pub const DEFAULT_MIN_ARCHIVE_BYTES: u64 = 1024;

/// Directory under the home directory used for `-g` installs.
pub const GLOBAL_DIR_NAME: &str = ".cnsh-global";

/// Runtime configuration for the package manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CnshConfig {
    /// Base URL of the registry metadata endpoint.
    pub registry_url: String,
    /// Minimum size a downloaded archive must have.
    pub min_archive_bytes: u64,
    /// Upper bound on concurrently running installs during `install`.
    pub max_concurrent_installs: usize,
    /// Timeout applied to every HTTP request.
    pub request_timeout_secs: u64,
    /// Root used for `-g` installs. Defaults to `$HOME/.cnsh-global`.
    pub global_dir: Option<PathBuf>,
}

impl Default for CnshConfig {
    fn default() -> Self {
        CnshConfig {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            min_archive_bytes: DEFAULT_MIN_ARCHIVE_BYTES,
            max_concurrent_installs: 8,
            request_timeout_secs: 30,
            global_dir: None,
        }
    }
}

impl CnshConfig {
    /// Load configuration for a project directory.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let mut config = Self::from_file(&project_dir.join(CONFIG_FILE_NAME))?;
        if let Ok(url) = std::env::var(REGISTRY_ENV_VAR) {
            if !url.trim().is_empty() {
                config.registry_url = url;
            }
        }
        Ok(config)
    }

    /// Read a config file, falling back to defaults when it does not exist.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| CnshError::io(path, e))?;
        Self::parse(&content).map_err(|detail| CnshError::Config {
            path: path.to_path_buf(),
            detail,
        })
    }

    fn parse(content: &str) -> std::result::Result<Self, String> {
        let mut config: CnshConfig = toml::from_str(content).map_err(|e| e.to_string())?;
        if config.registry_url.trim().is_empty() {
            return Err("registry_url must not be empty".to_string());
        }
        config.registry_url = config.registry_url.trim_end_matches('/').to_string();
        config.max_concurrent_installs = config.max_concurrent_installs.max(1);
        Ok(config)
    }

    /// HTTP request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Root directory for global installs, if one can be determined.
    pub fn global_root(&self) -> Option<PathBuf> {
        self.global_dir
            .clone()
            .or_else(|| dirs::home_dir().map(|home| home.join(GLOBAL_DIR_NAME)))
    }
}
