//! src/config.rs
//! ============================================================================
//! # Config: delegation behaviour and logging settings
//!
//! Settings are plain TOML with two sections, `[delegator]` and `[logging]`.
//! Missing sections or fields fall back to defaults, so an empty file is a
//! valid configuration.
//!
//! On native targets the config lives at the platform config dir resolved by
//! [`directories`](https://docs.rs/directories) and is read/written with
//! `tokio::fs`. On wasm32 only the in-memory parsing is available.
//!
//! ## Example
//! ```rust,ignore
//! let config = Config::load().await?;
//! let delegator = Delegator::with_config(doc, config.delegator.clone());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::DelegateError;
#[cfg(not(target_arch = "wasm32"))]
use crate::logging::LoggerConfig;

/// Behaviour switches for a [`Delegator`](crate::Delegator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelegatorConfig {
    /// Attach the root listener as soon as a new event type is registered
    /// after `initialize`. When off, such registrations stay inert until the
    /// next `initialize` and a warning is logged.
    pub auto_attach: bool,

    /// Suppress the default action of events that reach a handler.
    pub prevent_default: bool,
}

impl Default for DelegatorConfig {
    fn default() -> Self {
        Self {
            auto_attach: true,
            prevent_default: true,
        }
    }
}

/// Main configuration struct.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub delegator: DelegatorConfig,

    #[cfg(not(target_arch = "wasm32"))]
    pub logging: LoggerConfig,
}

impl Config {
    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, DelegateError> {
        Ok(toml::from_str(text)?)
    }

    /// Render the config as pretty TOML.
    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod file {
    use std::path::{Path, PathBuf};

    use anyhow::Context;
    use directories::ProjectDirs;
    use tokio::fs as TokioFs;
    use tracing::info;

    use super::Config;
    use crate::error::DelegateError;

    impl Config {
        /// Loads config from the platform config dir, or returns defaults.
        ///
        /// The config is expected at `$XDG_CONFIG_HOME/delegate/config.toml`
        /// (Linux), or equivalent on Windows/macOS. A missing file is created
        /// with default contents.
        pub async fn load() -> anyhow::Result<Self> {
            let path = Self::config_path()?;

            if TokioFs::try_exists(&path).await.unwrap_or(false) {
                Ok(Self::load_from(&path).await?)
            } else {
                info!(
                    "No config file found at {}, using default configuration. Creating it now.",
                    path.display()
                );

                let default_config = Self::default();
                default_config.save_to(&path).await?;

                Ok(default_config)
            }
        }

        /// Loads config from an explicit path.
        pub async fn load_from(path: &Path) -> Result<Self, DelegateError> {
            info!("Loading config from {}", path.display());

            let text = TokioFs::read_to_string(path)
                .await
                .map_err(|source| DelegateError::ConfigIo {
                    path: path.to_path_buf(),
                    source,
                })?;

            Self::from_toml_str(&text)
        }

        /// Saves config to the platform config dir.
        pub async fn save(&self) -> anyhow::Result<()> {
            let path = Self::config_path()?;
            self.save_to(&path).await
        }

        /// Saves config to an explicit path, creating parent directories.
        pub async fn save_to(&self, path: &Path) -> anyhow::Result<()> {
            info!("Saving config to {}", path.display());

            if let Some(parent) = path.parent() {
                TokioFs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }

            let toml_str = self.to_toml_string()?;
            TokioFs::write(path, toml_str)
                .await
                .with_context(|| format!("writing {}", path.display()))?;

            Ok(())
        }

        /// Returns the canonical config file path using `directories::ProjectDirs`.
        pub fn config_path() -> anyhow::Result<PathBuf> {
            Ok(Self::config_dir()?.join("config.toml"))
        }

        /// Returns the config directory (without filename).
        pub fn config_dir() -> anyhow::Result<PathBuf> {
            let proj_dirs = ProjectDirs::from("org", "delegate", "delegate")
                .ok_or_else(|| anyhow::anyhow!("Could not determine config directory."))?;
            Ok(proj_dirs.config_dir().to_path_buf())
        }
    }
}
