//! Configuration Loader (Figment-based)
//!
//! Loads and merges configuration from multiple sources using Figment:
//! 1. Built-in defaults (Serialized)
//! 2. Global config (`<config dir>/bookbuddy/config.toml`)
//! 3. Project config (`.bookbuddy/config.toml`)
//! 4. Environment variables (`BOOKBUDDY_*` prefix)

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use tracing::{debug, info};

use super::types::Config;
use crate::types::{BuddyError, Result};

const ENV_PREFIX: &str = "BOOKBUDDY_";

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with full resolution chain:
    /// defaults → global → project → env vars
    pub fn load() -> Result<Config> {
        Self::load_with(Self::global_config_path(), &Self::project_config_path())
    }

    /// Load configuration from a specific file only, plus environment
    pub fn load_from_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(BuddyError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        Self::load_with(None, path)
    }

    fn load_with(global: Option<PathBuf>, project: &Path) -> Result<Config> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(global_path) = global
            && global_path.exists()
        {
            debug!("Loading global config from: {}", global_path.display());
            figment = figment.merge(Toml::file(&global_path));
        }

        if project.exists() {
            debug!("Loading project config from: {}", project.display());
            figment = figment.merge(Toml::file(project));
        }

        // BOOKBUDDY_LLM_MODEL -> llm.model; double underscore keeps
        // multi-word keys intact (BOOKBUDDY_ANALYSIS__CACHE_ENABLED)
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").lowercase(true));
        figment = figment.merge(Self::simple_env());

        let config: Config = figment
            .extract()
            .map_err(|e| BuddyError::Config(format!("Configuration error: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Single-underscore form for the common one-word keys
    fn simple_env() -> Env {
        Env::prefixed(ENV_PREFIX)
            .filter(|key| {
                matches!(
                    key.as_str().to_ascii_lowercase().as_str(),
                    "llm_provider" | "llm_model" | "llm_temperature" | "llm_api_base"
                )
            })
            .map(|key| key.as_str().replacen('_', ".", 1).into())
            .lowercase(true)
    }

    // =========================================================================
    // Path Management
    // =========================================================================

    fn project_dirs() -> Option<ProjectDirs> {
        ProjectDirs::from("", "", "bookbuddy")
    }

    /// Per-user configuration directory
    pub fn global_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_dir().map(|dir| dir.join("config.toml"))
    }

    /// Per-user data directory (default database location)
    pub fn data_dir() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
    }

    pub fn project_config_path() -> PathBuf {
        Self::project_dir().join("config.toml")
    }

    pub fn project_dir() -> PathBuf {
        PathBuf::from(".bookbuddy")
    }

    /// Resolved database path: configured path, else the data directory,
    /// else the project directory
    pub fn database_path(config: &Config) -> PathBuf {
        config.storage.path.clone().unwrap_or_else(|| {
            Self::data_dir()
                .unwrap_or_else(Self::project_dir)
                .join("analyses.db")
        })
    }

    // =========================================================================
    // Initialization
    // =========================================================================

    /// Write a default config file (global or project); existing files are
    /// kept unless `force` is set
    pub fn init(global: bool, force: bool) -> Result<PathBuf> {
        let path = if global {
            Self::global_config_path().ok_or_else(|| {
                BuddyError::Config("Cannot determine global config directory".to_string())
            })?
        } else {
            Self::project_config_path()
        };

        Self::write_default(&path, force)?;
        Ok(path)
    }

    fn write_default(path: &Path, force: bool) -> Result<()> {
        if path.exists() && !force {
            info!("Config exists: {}", path.display());
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, Self::default_config_toml())?;
        info!("Created config: {}", path.display());
        Ok(())
    }

    /// Default config content (TOML)
    fn default_config_toml() -> &'static str {
        r#"# Book Buddy Configuration
# Project settings in .bookbuddy/config.toml override the user-wide file.

version = "1.0"

[llm]
provider = "openai"
model = "gpt-4o-mini"
timeout_secs = 300
temperature = 0.3
# api_key is read from OPENAI_API_KEY when unset

[analysis]
max_tokens_per_chunk = 3000
overlap_tokens = 200
preserve_sentences = true
estimation = "heuristic"
cache_enabled = true
cache_max_size = 100
cache_ttl_hours = 24
inter_chunk_delay_ms = 1000
request_timeout_secs = 120
max_retries = 2
persist_results = true

[rate_limit]
enabled = true
max_requests_per_window = 20
window_secs = 60
max_cost_per_hour_usd = 5.0

[storage]
backend = "sqlite"
"#
    }
}
