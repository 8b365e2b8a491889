//! Configuration type definitions for the execution engine
//!
//! Every field carries a default so an empty YAML document is a valid
//! configuration; a studio running on a machine with `python3` on the `PATH`
//! needs no configuration file at all.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::StudioError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StudioConfig {
    #[serde(default)]
    pub interpreter: InterpreterConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub errors: ErrorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the interpreter child process is located and started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Explicit interpreter executable; discovered on the `PATH` when absent.
    #[serde(default)]
    pub python: Option<PathBuf>,
    /// Extra interpreter flags placed before the driver arguments.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,
}

/// Policy applied when a second execution arrives while one is in flight.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    /// Wait for the active execution, first come first served.
    #[default]
    Queue,
    /// Fail immediately with `StudioError::Busy`.
    Reject,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub overlap: OverlapPolicy,
    /// Watchdog for a single program. Absent means no limit.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorConfig {
    /// Additional substrings marking traceback lines as runtime internals.
    #[serde(default)]
    pub internal_markers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_startup_timeout() -> u64 { 30 }
fn default_log_level() -> String { "info".to_string() }

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            python: None,
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            startup_timeout_secs: default_startup_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl InterpreterConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }
}

impl ExecutionConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl StudioConfig {
    pub fn validate(&self) -> Result<(), StudioError> {
        if self.interpreter.startup_timeout_secs == 0 {
            return Err(StudioError::ConfigError(
                "interpreter.startup_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.execution.timeout_secs == Some(0) {
            return Err(StudioError::ConfigError(
                "execution.timeout_secs must be greater than zero when set".to_string(),
            ));
        }
        if self.errors.internal_markers.iter().any(|m| m.trim().is_empty()) {
            return Err(StudioError::ConfigError(
                "errors.internal_markers must not contain empty markers".to_string(),
            ));
        }
        if let Some(python) = &self.interpreter.python {
            if python.as_os_str().is_empty() {
                return Err(StudioError::ConfigError(
                    "interpreter.python must not be empty".to_string(),
                ));
            }
        }
        match self.logging.level.to_lowercase().as_str() {
            "off" | "error" | "warn" | "info" | "debug" | "trace" => Ok(()),
            other => Err(StudioError::ConfigError(format!(
                "Unknown log level '{}'",
                other
            ))),
        }
    }
}
