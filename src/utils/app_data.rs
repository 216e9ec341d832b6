use crate::index::loader::DEFAULT_SHARD_PATTERNS;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const APP_NAME: &str = "dxi";
const CONFIG_FILE: &str = "config.json";

/// Conventional name of the generated search directory
pub const SEARCH_DIR_NAME: &str = "search";

/// Application configuration stored in the app data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Search directories used when none are given on the command line
    #[serde(default)]
    pub default_index_dirs: Vec<PathBuf>,

    /// File-name globs that identify shard files
    #[serde(default = "default_shard_patterns")]
    pub shard_patterns: Vec<String>,

    /// Maximum hits printed per query (0 means unlimited)
    #[serde(default = "default_limit")]
    pub default_limit: usize,

    /// Parse shards on first use instead of up front
    #[serde(default)]
    pub lazy_loading: bool,

    /// Cached result lists per index in the daemon
    #[serde(default = "default_query_cache_size")]
    pub query_cache_size: usize,
}

fn default_shard_patterns() -> Vec<String> {
    DEFAULT_SHARD_PATTERNS.iter().map(|p| p.to_string()).collect()
}

fn default_limit() -> usize {
    50
}

fn default_query_cache_size() -> usize {
    128
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            default_index_dirs: Vec::new(),
            shard_patterns: default_shard_patterns(),
            default_limit: default_limit(),
            lazy_loading: false,
            query_cache_size: default_query_cache_size(),
        }
    }
}

impl AppConfig {
    /// Load config from the app data directory, or return default if not found
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;
        Self::load_from(&config_path)
    }

    /// Load config from a specific file, or return default if it does not exist
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
        let config: AppConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))?;
        tracing::debug!(path = %config_path.display(), "loaded config");
        Ok(config)
    }

    /// Save config to the app data directory
    #[allow(dead_code)]
    pub fn save(&self) -> Result<()> {
        let config_path = get_config_path()?;
        let content = serde_json::to_string_pretty(self)
            .context("Failed to serialize config")?;
        fs::write(&config_path, content)
            .context("Failed to write config file")?;
        Ok(())
    }

    /// Effective hit limit (None for unlimited)
    pub fn effective_limit(&self) -> Option<usize> {
        match self.default_limit {
            0 => None,
            n => Some(n),
        }
    }

    /// Query cache capacity, never zero
    pub fn effective_cache_size(&self) -> usize {
        self.query_cache_size.max(1)
    }
}

/// Pick the search directories for a command.
///
/// Explicit directories win, then the configured defaults, then `./search`
/// when it exists, then the current directory.
pub fn resolve_index_dirs(explicit: &[PathBuf], config: &AppConfig, cwd: &Path) -> Vec<PathBuf> {
    let chosen: Vec<PathBuf> = if !explicit.is_empty() {
        explicit.to_vec()
    } else if !config.default_index_dirs.is_empty() {
        config.default_index_dirs.clone()
    } else if cwd.join(SEARCH_DIR_NAME).is_dir() {
        vec![cwd.join(SEARCH_DIR_NAME)]
    } else {
        vec![cwd.to_path_buf()]
    };

    chosen
        .into_iter()
        .map(|dir| {
            let dir = if dir.is_absolute() { dir } else { cwd.join(dir) };
            dir.canonicalize().unwrap_or(dir)
        })
        .collect()
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let app_dir = get_app_data_dir()?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// Get the per-user application data directory
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir()
            .map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.context("Could not determine app data directory")?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}
