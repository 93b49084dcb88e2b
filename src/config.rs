//! Application configuration management.
//!
//! Settings are layered with figment, later layers overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. `config.toml` in the platform configuration directory
//! 3. `LINKDUPE_*` environment variables
//! 4. Command-line options (applied by the caller)

use std::path::PathBuf;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::checksum::{get_algorithm, Algorithm};
use crate::copy::DEFAULT_CHUNK_SIZE;

/// Prefix of environment variables read into [`Config`].
pub const ENV_PREFIX: &str = "LINKDUPE_";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Pool folder used when `--symlink-folder` is not given.
    pub symlink_folder: PathBuf,
    /// Registry key of the default checksum algorithm.
    pub checksum_algo: String,
    /// Read size when streaming files.
    pub chunk_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            symlink_folder: PathBuf::from(".symlinks"),
            checksum_algo: Algorithm::default().name().to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Config {
    /// Load the configuration from the default file and the environment.
    ///
    /// A missing configuration file is not an error.
    pub fn load() -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = Self::config_path() {
            log::trace!("Reading configuration from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        Self::extract(figment.merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Validate and extract a configuration from `figment`.
    pub fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .context("Failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// The configured checksum algorithm.
    pub fn algorithm(&self) -> Result<Algorithm> {
        get_algorithm(&self.checksum_algo).context("Invalid checksum_algo in configuration")
    }

    fn validate(&self) -> Result<()> {
        self.algorithm()?;
        if self.chunk_size == 0 {
            anyhow::bail!("Invalid chunk_size in configuration: must be greater than zero");
        }
        Ok(())
    }

    /// Get the default platform-specific configuration path.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "linkdupe").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
