//! Configuration file parsing
//!
//! Reads settings from `~/.glidegen/config.toml`. Every field is optional in
//! the file; command-line flags override whatever is loaded here.

use glidegen_render::{ElementComparison, RenderMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Error type for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),

    #[error("Could not determine config location: {0}")]
    Home(String),
}

/// Result type for config operations
pub type Result<T> = std::result::Result<T, ConfigError>;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const CACHE_DB_FILE_NAME: &str = "cache.sqlite3";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlidegenConfig {
    /// Instance base URL, e.g. `https://dev12345.service-now.com`
    #[serde(default)]
    pub instance_url: Option<String>,

    #[serde(default)]
    pub user_name: Option<String>,

    /// OAuth client id; when set, requests use bearer tokens
    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub mode: RenderMode,

    /// Declaration file written by `generate`
    #[serde(default = "default_output")]
    pub output: PathBuf,

    /// Cache store location; defaults to `~/.glidegen/cache.sqlite3`
    #[serde(default)]
    pub database: Option<PathBuf>,

    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Re-declare inherited columns whose comments differ
    #[serde(default)]
    pub compare_comments: bool,
}

impl Default for GlidegenConfig {
    fn default() -> Self {
        Self {
            instance_url: None,
            user_name: None,
            client_id: None,
            mode: RenderMode::default(),
            output: default_output(),
            database: None,
            max_concurrent_fetches: default_max_concurrent_fetches(),
            request_timeout_seconds: default_request_timeout(),
            compare_comments: false,
        }
    }
}

fn default_output() -> PathBuf { PathBuf::from("types.d.ts") }
fn default_max_concurrent_fetches() -> usize { 4 }
fn default_request_timeout() -> u64 { 60 }

impl GlidegenConfig {
    /// Load from a file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load from `~/.glidegen/config.toml`.
    pub fn load_default() -> Result<Self> {
        Self::load(&default_config_path()?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Configured cache store path, or the default under the home directory.
    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database {
            Some(path) => Ok(path.clone()),
            None => Ok(glidegen_home()?.join(CACHE_DB_FILE_NAME)),
        }
    }

    pub fn comparison(&self) -> ElementComparison {
        ElementComparison {
            compare_comments: self.compare_comments,
        }
    }
}

/// Get the config file path: ~/.glidegen/config.toml
pub fn default_config_path() -> Result<PathBuf> {
    Ok(glidegen_home()?.join(CONFIG_FILE_NAME))
}

fn glidegen_home() -> Result<PathBuf> {
    glidegen_logging::glidegen_home().map_err(|e| ConfigError::Home(e.to_string()))
}
