//! Configuration management for mediafetch
//!
//! Settings are layered, lowest priority first:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables
//!
//! # Environment Variables
//!
//! Any value can be overridden with `MEDIAFETCH__<section>__<key>`:
//! - `MEDIAFETCH__SERVER__BIND_ADDR=127.0.0.1:9000`
//! - `MEDIAFETCH__WORKER__MAX_DURATION=30m`
//! - `MEDIAFETCH__RETENTION__ARTIFACT_TTL=48h`
//!
//! # Configuration File
//!
//! Loaded from `config/mediafetch.toml` unless `MEDIAFETCH_CONFIG` points elsewhere.
//! The file is optional.

mod models;
mod sources;
mod validation;

pub use crate::humanize::{ByteSize, HumanDuration};
pub use models::{
    Config, RetentionConfig, ServerConfig, SourcesConfig, StorageConfig, WorkerConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment) and validate it
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validation::validate(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_full_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("mediafetch.toml");

        let toml_content = r#"
[server]
bind_addr = "0.0.0.0:8080"
data_path = "data"

[storage]
root = "uploads"

[worker]
count = 8
channel_size = 16
max_duration = "1h"
extractor_path = "/usr/local/bin/yt-dlp"
transcoder = "ffmpeg"
cookies_dir = "data/cookies"

[retention]
artifact_ttl = "12h"
sweep_interval = "10s"
session_ttl = "30m"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = Config::load_from_path(config_path).unwrap();
        assert_eq!(config.worker.count, 8);
        assert_eq!(config.worker.channel_size, 16);
        assert_eq!(config.retention.session_ttl.as_secs(), 1800);
    }

    #[test]
    fn test_validation_runs_on_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("mediafetch.toml");

        fs::write(
            &config_path,
            r#"
[worker]
max_duration = "24h"

[retention]
artifact_ttl = "1h"
            "#,
        )
        .unwrap();

        let result = Config::load_from_path(config_path);
        assert!(matches!(
            result,
            Err(ConfigError::ValidationError(
                ValidationError::RetentionTooShort { .. }
            ))
        ));
    }
}
