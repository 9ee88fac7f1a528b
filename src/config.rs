//! Application configuration
//!
//! Everything lives in one TOML file, by default
//! `<config dir>/tello_joy/config.toml`. Missing sections and fields fall back
//! to their defaults, so an empty file is a valid configuration.

use crate::joy::DriverSettings;
use crate::lifecycle::NodeSettings;
use crate::mapping::InputBinding;
use crate::transport::mqtt::MqttSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "tello_joy";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub node: NodeSettings,
    pub binding: InputBinding,
    pub mqtt: MqttSettings,
    pub driver: DriverSettings,
}

impl AppConfig {
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let io_error = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await.map_err(io_error)?;
        debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Writes the default configuration to `path` unless a file is already
    /// there. Returns whether a file was created.
    pub async fn ensure_default_config(path: &Path) -> Result<bool, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        if exists {
            return Ok(false);
        }

        info!("Creating default configuration at {}", path.display());
        Self::default().save(path).await?;
        Ok(true)
    }

    /// Loads from `path`, or from the default location when none is given,
    /// creating the file with defaults first if needed.
    pub async fn load_or_init(path: Option<PathBuf>) -> Result<(Self, PathBuf), ConfigError> {
        let path = path.unwrap_or_else(Self::default_path);
        Self::ensure_default_config(&path).await?;
        let config = Self::load(&path).await?;
        Ok((config, path))
    }
}
