//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod resources;

pub use resources::{ResourceNames, ResourcesConfig};

use serde::Deserialize;

use crate::bus::MessagingConfig;
use crate::commands::CommandConfig;
use crate::projector::ProjectorConfig;
use crate::relay::RelayConfig;
use crate::storage::StorageConfig;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "CLASSCONNECT_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "CLASSCONNECT";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "CLASSCONNECT_LOG";

/// Legacy variable naming the Aggregate Version Record table.
pub const AGGREGATES_TABLE_ENV_VAR: &str = "DYNAMODB_TABLE_AGGREGATES";
/// Legacy variable naming the Event Record table.
pub const EVENTS_TABLE_ENV_VAR: &str = "DYNAMODB_TABLE_EVENTS";
/// Legacy variable naming the read model table.
pub const READ_MODEL_TABLE_ENV_VAR: &str = "DYNAMODB_TABLE_CLASSCONNECT";
/// Legacy variable naming the relay queue.
pub const RELAY_QUEUE_ENV_VAR: &str = "NEW_EVENTS_QUEUE";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key} (set it in config or via {env_var})")]
    Missing {
        key: &'static str,
        env_var: &'static str,
    },

    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Table and queue identifiers.
    pub resources: ResourcesConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Relay queue configuration.
    pub messaging: MessagingConfig,
    /// Change relay configuration.
    pub relay: RelayConfig,
    /// Projector configuration.
    pub projector: ProjectorConfig,
    /// Command handler configuration.
    pub commands: CommandConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `config.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    /// 5. Legacy resource-name variables (`DYNAMODB_TABLE_*`, `NEW_EVENTS_QUEUE`)
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new("config", FileFormat::Yaml).required(false))
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(CONFIG_ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        for (key, env_var) in resources::LEGACY_OVERRIDES {
            builder = builder.set_override_option(key, std::env::var(env_var).ok())?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Resolve every required table and queue identifier.
    ///
    /// Fails with the first one that is absent or blank.
    pub fn resources(&self) -> Result<ResourceNames, ConfigError> {
        self.resources.resolve()
    }

    /// Create config for testing: in-memory storage, channel queue,
    /// default resource names.
    pub fn for_test() -> Self {
        Self {
            resources: ResourcesConfig::for_test(),
            storage: StorageConfig {
                storage_type: crate::storage::StorageType::Memory,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
