//! The execution engine: the interpreter session, the gate that serializes
//! access to it, and the error normalizer, wired together.
//!
//! The Run protocol lives in `runner` and the Grade protocol in `grader`; both
//! are methods on [`Engine`].

use serde::Serialize;
use std::sync::Arc;

use crate::config::types::{OverlapPolicy, StudioConfig};
use crate::errors::StudioError;
use crate::gate::{ExecutionGate, OperationKind};
use crate::interpreter::{InterpreterLauncher, PythonLauncher};
use crate::normalize::ErrorNormalizer;
use crate::session::{InterpreterSession, SessionState};

pub struct Engine {
    pub(crate) session: InterpreterSession,
    pub(crate) gate: ExecutionGate,
    pub(crate) normalizer: ErrorNormalizer,
}

/// Point-in-time view of the runtime, for health endpoints and diagnostics.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeStatus {
    pub state: SessionState,
    pub ready: bool,
    pub version: Option<String>,
    pub launches: u64,
    pub current_operation: Option<OperationKind>,
    pub overlap_policy: OverlapPolicy,
    pub last_error: Option<String>,
}

impl Engine {
    pub fn new(launcher: Arc<dyn InterpreterLauncher>) -> Self {
        Self {
            session: InterpreterSession::new(launcher),
            gate: ExecutionGate::new(OverlapPolicy::default()),
            normalizer: ErrorNormalizer::default(),
        }
    }

    /// Engine backed by a CPython child process as described by `config`.
    pub fn from_config(config: &StudioConfig) -> Self {
        Self::new(Arc::new(PythonLauncher::from_config(config)))
            .with_overlap_policy(config.execution.overlap)
            .with_normalizer(ErrorNormalizer::new(config.errors.internal_markers.clone()))
    }

    pub fn with_overlap_policy(mut self, policy: OverlapPolicy) -> Self {
        self.gate = ExecutionGate::new(policy);
        self
    }

    pub fn with_normalizer(mut self, normalizer: ErrorNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn session(&self) -> &InterpreterSession {
        &self.session
    }

    pub fn gate(&self) -> &ExecutionGate {
        &self.gate
    }

    pub fn normalizer(&self) -> &ErrorNormalizer {
        &self.normalizer
    }

    pub fn is_ready(&self) -> bool {
        self.session.is_ready()
    }

    /// Boots the interpreter ahead of the first execution and returns its version.
    pub async fn warm_up(&self) -> Result<String, StudioError> {
        let interpreter = self.session.acquire().await?;
        Ok(interpreter.version().to_string())
    }

    pub fn status(&self) -> RuntimeStatus {
        RuntimeStatus {
            state: self.session.state(),
            ready: self.session.is_ready(),
            version: self.session.version(),
            launches: self.session.launch_count(),
            current_operation: self.gate.current_operation(),
            overlap_policy: self.gate.policy(),
            last_error: self.session.last_error().map(|e| e.to_string()),
        }
    }
}
