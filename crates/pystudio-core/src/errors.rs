//! Error types for infrastructure failures of the execution engine
//!
//! Only failures of the runtime itself travel through this type: an interpreter
//! that cannot start, a broken driver protocol, a sandbox that could not be
//! installed or restored. Failures of guest code are never represented here;
//! they are returned as data inside `ExecutionResult` and `TestOutcome`.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StudioError {
    #[error("Python runtime unavailable: {0}")]
    InterpreterUnavailable(String),
    #[error("Interpreter protocol error: {0}")]
    ProtocolError(String),
    #[error("Sandbox error: {0}")]
    SandboxError(String),
    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),
    #[error("Another execution is already in progress")]
    Busy,
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("I/O error: {0}")]
    IoError(String),
}

impl StudioError {
    /// True when the error means the runtime cannot be used at all, as opposed to
    /// a transient condition such as another execution holding the gate.
    pub fn is_unavailable(&self) -> bool {
        !matches!(self, StudioError::Busy | StudioError::ConfigError(_))
    }
}

impl From<std::io::Error> for StudioError {
    fn from(err: std::io::Error) -> Self {
        StudioError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for StudioError {
    fn from(err: serde_json::Error) -> Self {
        StudioError::ProtocolError(err.to_string())
    }
}
