//! Strata configuration management
//!
//! Data sources, tuning knobs of the DAO layer and logging settings, read
//! from a TOML file and overridable through environment variables.

use crate::options::DaoOptions;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Configured data sources
    pub data_sources: Vec<DataSourceConfig>,

    /// DAO tuning
    pub advanced: AdvancedConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(threshold) = env_parse("STRATA_SUPERNODE_THRESHOLD")? {
            config.advanced.supernode_threshold = threshold;
        }
        if let Some(length) = env_parse("STRATA_MAX_PATH_LENGTH")? {
            config.advanced.max_path_length = length;
        }
        if let Some(retries) = env_parse("STRATA_CONNECTION_RETRIES")? {
            config.advanced.connection_retries = retries;
        }

        // Logging
        if let Ok(level) = std::env::var("STRATA_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(json) = env_parse("STRATA_LOG_JSON")? {
            config.logging.json_format = json;
        }

        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        let env_config = Self::from_env()?;
        let defaults = AdvancedConfig::default();

        // Only override if env values differ from defaults
        if env_config.advanced.supernode_threshold != defaults.supernode_threshold {
            self.advanced.supernode_threshold = env_config.advanced.supernode_threshold;
        }
        if env_config.advanced.max_path_length != defaults.max_path_length {
            self.advanced.max_path_length = env_config.advanced.max_path_length;
        }
        if env_config.advanced.connection_retries != defaults.connection_retries {
            self.advanced.connection_retries = env_config.advanced.connection_retries;
        }
        if std::env::var("STRATA_LOG_LEVEL").is_ok() {
            self.logging.level = env_config.logging.level;
        }
        if std::env::var("STRATA_LOG_JSON").is_ok() {
            self.logging.json_format = env_config.logging.json_format;
        }

        Ok(self)
    }

    /// Source names must be unique and non-empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for source in &self.data_sources {
            if source.name.is_empty() {
                return Err(ConfigError::MissingRequired("data_sources.name".to_string()));
            }
            if source.graphdb.vendor.is_empty() {
                return Err(ConfigError::MissingRequired(format!(
                    "data_sources.{}.graphdb.vendor",
                    source.name
                )));
            }
            if !seen.insert(source.name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: "data_sources.name".to_string(),
                    value: source.name.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn data_source(&self, name: &str) -> Option<&DataSourceConfig> {
        self.data_sources.iter().find(|s| s.name == name)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

/// One logical data source: a graph database and an optional search index
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    /// Unique name, also the default index name
    pub name: String,

    /// Graph database vendor and options
    pub graphdb: VendorConfig,

    /// Search index vendor and options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<VendorConfig>,
}

/// A vendor name plus its flat options; `vendor` never reaches the DAO
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VendorConfig {
    pub vendor: String,

    #[serde(flatten)]
    pub options: DaoOptions,
}

/// DAO tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvancedConfig {
    /// Ceiling for shortest-path depth
    pub max_path_length: u64,

    /// Maximum number of shortest paths returned
    pub shortest_paths_max_results: u64,

    /// Neighbour count above which a node is a supernode
    pub supernode_threshold: u64,

    /// Maximum matches of a raw query
    pub max_matches_limit: u64,

    /// Search fuzziness when the caller gives none
    pub default_fuzziness: f64,

    /// Connection attempts of a data source
    pub connection_retries: u32,

    /// Delay between connection attempts
    pub connection_retry_delay_ms: u64,

    /// Attempts of an index commit
    pub commit_retries: u32,

    /// Delay between commit attempts
    pub commit_retry_delay_ms: u64,

    /// Timeout of a connector's connect call
    pub connect_timeout_ms: u64,
}

impl AdvancedConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for AdvancedConfig {
    fn default() -> Self {
        Self {
            max_path_length: 20,
            shortest_paths_max_results: 10,
            supernode_threshold: 10_000,
            max_matches_limit: 5_000,
            default_fuzziness: 0.9,
            connection_retries: 5,
            connection_retry_delay_ms: 5_000,
            commit_retries: 5,
            commit_retry_delay_ms: 3_000,
            connect_timeout_ms: 10_000,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
