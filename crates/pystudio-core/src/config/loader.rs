//! Configuration loader for YAML files and environment overrides

use crate::config::types::*;
use crate::errors::StudioError;
use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

pub const DEFAULT_CONFIG_FILE: &str = "pystudio.yaml";

pub const ENV_PYTHON: &str = "PYSTUDIO_PYTHON";
pub const ENV_LOG_LEVEL: &str = "PYSTUDIO_LOG_LEVEL";
pub const ENV_TIMEOUT_SECS: &str = "PYSTUDIO_TIMEOUT_SECS";

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<StudioConfig, StudioError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            StudioError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_str(&content)
    }

    /// Load `path` when given; otherwise the default file if it exists, else defaults.
    pub async fn from_optional_file(path: Option<&Path>) -> Result<StudioConfig, StudioError> {
        match path {
            Some(path) => Self::from_file(path).await,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    log::info!("Using configuration file {}", default_path.display());
                    Self::from_file(default_path).await
                } else {
                    let mut config = StudioConfig::default();
                    Self::resolve_environment(&mut config)?;
                    config.validate()?;
                    Ok(config)
                }
            }
        }
    }

    /// Load configuration from a YAML string
    pub fn from_str(content: &str) -> Result<StudioConfig, StudioError> {
        let mut config: StudioConfig = if content.trim().is_empty() {
            StudioConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| {
                StudioError::ConfigError(format!("Failed to parse YAML config: {}", e))
            })?
        };

        Self::resolve_environment(&mut config)?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_environment(config: &mut StudioConfig) -> Result<(), StudioError> {
        if let Ok(python) = env::var(ENV_PYTHON) {
            if !python.trim().is_empty() {
                log::debug!("Interpreter overridden by {}: {}", ENV_PYTHON, python);
                config.interpreter.python = Some(PathBuf::from(python));
            }
        }

        if let Ok(level) = env::var(ENV_LOG_LEVEL) {
            if !level.trim().is_empty() {
                config.logging.level = level;
            }
        }

        if let Ok(timeout) = env::var(ENV_TIMEOUT_SECS) {
            let secs = timeout.trim().parse::<u64>().map_err(|e| {
                StudioError::ConfigError(format!(
                    "{} must be a number of seconds, got '{}': {}",
                    ENV_TIMEOUT_SECS, timeout, e
                ))
            })?;
            config.execution.timeout_secs = Some(secs);
        }

        Ok(())
    }
}
