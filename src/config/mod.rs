//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod consumer;
mod messaging;
mod storage;

pub use consumer::{ConsumerConfig, TopicsConfig};
pub use messaging::{ChannelConfig, KafkaConfig, MessagingConfig, MessagingType};
pub use storage::{PostgresConfig, SqliteConfig, StorageConfig, StorageType};

use serde::Deserialize;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "LEDGERLINE_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "LEDGERLINE";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "LEDGERLINE_LOG";

/// Configuration errors.
///
/// All of these stop the process at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] ::config::ConfigError),

    /// A selected backend has no connection target configured.
    #[error("Missing required setting '{0}'")]
    MissingTarget(&'static str),

    /// A backend was selected whose cargo feature is not compiled in.
    #[error("{backend} backend selected but the '{feature}' feature is not enabled")]
    FeatureNotEnabled {
        backend: &'static str,
        feature: &'static str,
    },
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Ordered-log transport configuration.
    pub messaging: MessagingConfig,
    /// Topic names for the three streams.
    pub topics: TopicsConfig,
    /// Consumer loop tuning and group names.
    pub consumer: ConsumerConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}
