//! Configuration loading
//!
//! Layers, lowest precedence first: built-in defaults, the configuration
//! file, then `MODEL_BENCH__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use tracing::{debug, info};

use common::error::{Error, Result};

use crate::settings::BenchConfig;
use crate::validation::validate;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "MODEL_BENCH";

/// Configuration manager for a benchmark process
#[derive(Debug, Clone)]
pub struct ConfigManager {
    /// Effective configuration
    config: BenchConfig,

    /// File the configuration was read from, if any
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Loads configuration from `path`, or from the per-user default location
    /// when `path` is `None` and that file exists
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let source = match path {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|candidate| candidate.exists()),
        };

        let mut builder = Config::builder();

        if let Some(file) = &source {
            info!("Loading configuration from {}", file.display());
            builder = builder.add_source(File::from(file.as_path()).required(path.is_some()));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: BenchConfig = builder
            .build()
            .and_then(|raw| raw.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;

        validate(&config)?;
        debug!("Effective configuration: {:?}", config);

        Ok(Self { config, source })
    }

    /// Wraps an already-built configuration
    pub fn from_config(config: BenchConfig) -> Result<Self> {
        validate(&config)?;
        Ok(Self { config, source: None })
    }

    /// Per-user configuration file location
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("model-bench").join("config.toml"))
    }

    /// Effective configuration
    pub fn config(&self) -> &BenchConfig {
        &self.config
    }

    /// File the configuration was read from
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Consumes the manager, returning the configuration
    pub fn into_config(self) -> BenchConfig {
        self.config
    }
}
