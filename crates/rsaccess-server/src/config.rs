//! Configuration management for rsaccess.
//!
//! This module provides configuration loading with multiple sources:
//! 1. Default values (hardcoded)
//! 2. Configuration file (YAML)
//! 3. Environment variables (override)
//!
//! # Configuration Hierarchy
//!
//! Environment variables take precedence over config file values,
//! which take precedence over defaults.
//!
//! # Example
//!
//! ```ignore
//! use rsaccess_server::config::ServerConfig;
//!
//! // Load from file with env overrides
//! let config = ServerConfig::load("rsaccess.yaml")?;
//!
//! // Or load from environment only
//! let config = ServerConfig::from_env()?;
//! ```

use config::{Config, ConfigError, Environment, File, FileFormat};
use rsaccess_domain::{model::validate_name, DEFAULT_UNIVERSAL_GROUP};
use rsaccess_storage::SqliteConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix of environment variable overrides.
const ENV_PREFIX: &str = "RSACCESS";

/// Storage backends the server can run on.
pub const STORAGE_BACKENDS: &[&str] = &["memory", "sqlite"];

/// Server configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,

    /// Access graph settings
    #[serde(default)]
    pub access: AccessSettings,
}

/// Storage backend settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct StorageSettings {
    /// Storage backend type: "memory" or "sqlite"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Database connection URL (required if backend is "sqlite")
    pub database_url: Option<String>,

    /// Connection pool size
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            database_url: None,
            pool_size: default_pool_size(),
            connection_timeout_secs: default_connection_timeout(),
        }
    }
}

fn default_storage_backend() -> String {
    "memory".to_string()
}

fn default_pool_size() -> u32 {
    5
}

fn default_connection_timeout() -> u64 {
    5
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingSettings {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Use JSON format (true for production, false for development)
    #[serde(default)]
    pub json: bool,

    /// Emit an event when an instrumented span is entered and exited
    #[serde(default)]
    pub spans: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            spans: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Access graph settings.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct AccessSettings {
    /// Name of the group every other group descends from.
    ///
    /// Only used when a store is first created; renaming it later does not
    /// rename an existing SQLite universal group.
    #[serde(default = "default_universal_group")]
    pub universal_group: String,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            universal_group: default_universal_group(),
        }
    }
}

fn default_universal_group() -> String {
    DEFAULT_UNIVERSAL_GROUP.to_string()
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] ConfigError),

    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("invalid configuration: {message}")]
    Invalid { message: String },
}

fn environment() -> Environment {
    // Use __ as separator for nested keys: RSACCESS_STORAGE__BACKEND -> storage.backend
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
}

impl ServerConfig {
    /// Load configuration from a YAML file with environment variable overrides.
    ///
    /// Environment variables are prefixed with `RSACCESS_` and use `__` as
    /// separator. For example:
    /// - `RSACCESS_STORAGE__BACKEND=sqlite` overrides `storage.backend`
    /// - `RSACCESS_STORAGE__DATABASE_URL=...` overrides `storage.database_url`
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigLoadError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(File::from(path).format(FileFormat::Yaml))
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load configuration from environment variables only.
    ///
    /// Uses default values and allows overrides via RSACCESS_ prefixed env vars.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        let config = Config::builder()
            .add_source(Config::try_from(&ServerConfig::default())?)
            .add_source(environment())
            .build()?;

        let server_config: ServerConfig = config.try_deserialize()?;
        server_config.validate()?;

        Ok(server_config)
    }

    /// Load from `path` if given, otherwise from the environment alone.
    pub fn load_or_env(path: Option<&Path>) -> Result<Self, ConfigLoadError> {
        match path {
            Some(path) => Self::load(path),
            None => Self::from_env(),
        }
    }

    /// Validate the configuration.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if !STORAGE_BACKENDS.contains(&self.storage.backend.as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "storage.backend must be one of: {:?}, got: {}",
                    STORAGE_BACKENDS, self.storage.backend
                ),
            });
        }

        if self.storage.backend == "sqlite"
            && self
                .storage
                .database_url
                .as_deref()
                .map_or(true, |s| s.trim().is_empty())
        {
            return Err(ConfigLoadError::Invalid {
                message: "storage.database_url is required when backend is 'sqlite'".to_string(),
            });
        }

        if self.storage.pool_size == 0 {
            return Err(ConfigLoadError::Invalid {
                message: "storage.pool_size must be greater than 0".to_string(),
            });
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigLoadError::Invalid {
                message: format!(
                    "logging.level must be one of: {:?}, got: {}",
                    valid_levels, self.logging.level
                ),
            });
        }

        validate_name("group", &self.access.universal_group).map_err(|e| {
            ConfigLoadError::Invalid {
                message: format!("access.universal_group: {e}"),
            }
        })?;

        Ok(())
    }

    /// SQLite store options derived from the storage settings.
    pub fn sqlite_config(&self) -> SqliteConfig {
        SqliteConfig {
            database_url: self.storage.database_url.clone().unwrap_or_default(),
            max_connections: self.storage.pool_size,
            connect_timeout_secs: self.storage.connection_timeout_secs,
            universal_group: self.access.universal_group.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Test: Can load config from YAML file
    #[test]
    #[serial]
    fn test_can_load_config_from_yaml_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
storage:
  backend: sqlite
  database_url: "sqlite://access.db"
  pool_size: 8

logging:
  level: debug
  json: true
  spans: true

access:
  universal_group: everyone
"#
        )
        .unwrap();

        let config = ServerConfig::load(file.path()).unwrap();

        assert_eq!(config.storage.backend, "sqlite");
        assert_eq!(
            config.storage.database_url.as_deref(),
            Some("sqlite://access.db")
        );
        assert_eq!(config.storage.pool_size, 8);
        assert_eq!(config.storage.connection_timeout_secs, 5);
        assert_eq!(config.logging.level, "debug");
        assert!(config.logging.json);
        assert!(config.logging.spans);
        assert_eq!(config.access.universal_group, "everyone");
    }

    /// Test: Can override config with env vars
    #[test]
    #[serial]
    fn test_can_override_config_with_env_vars() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
storage:
  backend: memory

logging:
  level: info
"#
        )
        .unwrap();

        std::env::set_var("RSACCESS_STORAGE__POOL_SIZE", "12");
        std::env::set_var("RSACCESS_LOGGING__LEVEL", "warn");
        std::env::set_var("RSACCESS_LOGGING__SPANS", "true");

        let config = ServerConfig::load(file.path());

        std::env::remove_var("RSACCESS_STORAGE__POOL_SIZE");
        std::env::remove_var("RSACCESS_LOGGING__LEVEL");
        std::env::remove_var("RSACCESS_LOGGING__SPANS");

        let config = config.unwrap();
        assert_eq!(config.storage.pool_size, 12); // Overridden by env
        assert_eq!(config.storage.backend, "memory"); // From file
        assert_eq!(config.logging.level, "warn"); // Overridden by env
        assert!(config.logging.spans); // Overridden by env
    }

    /// Test: Config validation catches errors
    #[test]
    fn test_config_validation_catches_errors() {
        let mut config = ServerConfig::default();
        config.storage.backend = "postgres".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("storage.backend"));

        let test_cases = [
            ("sqlite", None, true),
            ("sqlite", Some(""), true),
            ("sqlite", Some("   "), true),
            ("sqlite", Some("sqlite::memory:"), false),
            ("memory", None, false),
        ];
        for (backend, url, should_err) in test_cases {
            let mut config = ServerConfig::default();
            config.storage.backend = backend.to_string();
            config.storage.database_url = url.map(str::to_string);
            let result = config.validate();

            if should_err {
                let err = result.expect_err(backend);
                assert!(
                    err.to_string().contains("database_url"),
                    "Error for '{backend}' should contain 'database_url'"
                );
            } else {
                assert!(result.is_ok(), "Expected ok for backend '{backend}' with {url:?}");
            }
        }

        let mut config = ServerConfig::default();
        config.storage.pool_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("pool_size"));

        let mut config = ServerConfig::default();
        config.logging.level = "verbose".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("logging.level"));

        let mut config = ServerConfig::default();
        config.access.universal_group = "42".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("universal_group"));
    }

    /// Test: Invalid config returns clear error
    #[test]
    fn test_invalid_config_returns_clear_error() {
        let result = ServerConfig::load("/nonexistent/path/rsaccess.yaml");
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigLoadError::FileNotFound { .. }));
        assert!(err.to_string().contains("not found"));

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "invalid: yaml: syntax: [").unwrap();
        let err = ServerConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigLoadError::Load(_)));
    }

    /// Test: Default config is valid
    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());

        assert_eq!(config.storage.backend, "memory");
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(!config.logging.spans);
        assert_eq!(config.access.universal_group, "universal");
    }

    /// Test: from_env loads defaults with env overrides
    #[test]
    #[serial]
    fn test_from_env_loads_defaults_with_env_overrides() {
        std::env::set_var("RSACCESS_ACCESS__UNIVERSAL_GROUP", "everyone");

        let config = ServerConfig::from_env();

        std::env::remove_var("RSACCESS_ACCESS__UNIVERSAL_GROUP");

        let config = config.unwrap();
        assert_eq!(config.access.universal_group, "everyone");
        assert_eq!(config.storage.backend, "memory"); // default
    }

    #[test]
    fn test_sqlite_config_carries_storage_settings() {
        let mut config = ServerConfig::default();
        config.storage.backend = "sqlite".to_string();
        config.storage.database_url = Some("sqlite://access.db".to_string());
        config.storage.pool_size = 3;
        config.access.universal_group = "everyone".to_string();

        let sqlite = config.sqlite_config();
        assert_eq!(sqlite.database_url, "sqlite://access.db");
        assert_eq!(sqlite.max_connections, 3);
        assert_eq!(sqlite.connect_timeout_secs, 5);
        assert_eq!(sqlite.universal_group, "everyone");
    }
}
