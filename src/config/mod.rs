//! Configuration management for Skiff

pub mod schema;

pub use schema::Config;

use crate::error::{SkiffError, SkiffResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Project config file name
pub const CONFIG_FILE_NAME: &str = "skiff.toml";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a config manager for `skiff.toml` in the current directory
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(CONFIG_FILE_NAME)
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skiff")
    }

    /// Get the default cache index path
    pub fn cache_index_path() -> PathBuf {
        Self::state_dir().join("cache.json")
    }

    /// Resolve the index path, honoring a configured override
    pub fn index_path(config: &Config) -> PathBuf {
        config
            .cache
            .index_path
            .clone()
            .unwrap_or_else(Self::cache_index_path)
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> SkiffResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> SkiffResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| SkiffError::io(format!("reading config from {}", path.display()), e))?;

        let mut config: Config =
            toml::from_str(&content).map_err(|e| SkiffError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        if let Some(image) = config.duplicate_artifact() {
            return Err(SkiffError::ConfigInvalid {
                path: path.to_path_buf(),
                reason: format!("artifact {} is configured more than once", image),
            });
        }

        let base = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);
        debug!(
            "Loaded {} artifact(s) from {}",
            config.artifacts.len(),
            path.display()
        );
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> SkiffResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            SkiffError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> SkiffResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| SkiffError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
