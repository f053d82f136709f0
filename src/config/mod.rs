//! Configuration management for ResizeBox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use resizebox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `RESIZEBOX__<section>__<key>`
//!
//! Examples:
//! - `RESIZEBOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `RESIZEBOX__POOL__POOL_SIZE=8`
//! - `RESIZEBOX__STORAGE__TTL_SECONDS=600`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/resizebox.toml`.
//! This can be overridden using the `RESIZEBOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::ByteSize;
pub use models::{Config, HubConfig, PoolSettings, ServerConfig, StorageConfig, TransformConfig};
pub use validation::ValidationError;

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::transform::Dimensions;
use crate::worker::PoolConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`RESIZEBOX__*`)
    /// 2. TOML file (default: `config/resizebox.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or a value
    /// fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    ///
    /// Environment overrides still apply.
    pub fn load_from_path(path: PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            pool_size: self.pool.pool_size,
            queue_capacity: self.pool.queue_capacity,
        }
    }

    pub fn default_dimensions(&self) -> Dimensions {
        Dimensions::new(self.transform.width, self.transform.height)
    }

    /// Largest target an upload may request
    pub fn max_dimensions(&self) -> Dimensions {
        Dimensions::new(self.transform.max_width, self.transform.max_height)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.storage.ttl_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.storage.sweep_interval_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.hub.write_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_minimal_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[transform]\nwidth = 640\n").unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.default_dimensions(), Dimensions::new(640, 200));
    }

    #[test]
    fn test_validation_rejects_zero_pool() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[pool]\npool_size = 0\n").unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result.unwrap_err(),
            ConfigError::ValidationError(ValidationError::MustBePositive {
                field: "pool.pool_size"
            })
        ));
    }

    #[test]
    fn test_full_config_example() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"
max_upload_bytes = "10MB"

[pool]
pool_size = 5
queue_capacity = 64

[hub]
queue_depth = 16
write_timeout_secs = 5

[storage]
root = "uploads"
ttl_seconds = 300
sweep_interval_secs = 30

[transform]
width = 300
height = 200
max_width = 2048
max_height = 1024
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();

        assert_eq!(config.pool_config(), PoolConfig::default());
        assert_eq!(config.ttl(), Duration::from_secs(300));
        assert_eq!(config.sweep_interval(), Duration::from_secs(30));
        assert_eq!(config.write_timeout(), Duration::from_secs(5));
        assert_eq!(config.default_dimensions(), Dimensions::new(300, 200));
        assert_eq!(config.max_dimensions(), Dimensions::new(2048, 1024));
    }
}
