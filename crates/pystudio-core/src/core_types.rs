use serde::{Deserialize, Serialize};

/// Outcome name recorded when the user program raises before assertions run.
pub const RUNTIME_ERROR_OUTCOME: &str = "runtime_error";
/// Outcome name recorded when the grading program as a whole could not run.
pub const FRAMEWORK_ERROR_OUTCOME: &str = "test_framework_error";

/// One program execution request: untrusted source plus queued `input()` answers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    pub source_text: String,
    #[serde(default)]
    pub mock_inputs: Vec<String>,
}

impl ExecutionRequest {
    pub fn new(source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
            mock_inputs: Vec::new(),
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<String>) -> Self {
        self.mock_inputs = inputs;
        self
    }
}

/// Output captured by the sandbox during one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    pub stdout: String,
    pub stderr: String,
    /// Normalized message of the user program's failure, if it failed.
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// A named acceptance test supplied by the lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAssertion {
    pub name: String,
    #[serde(alias = "assertion")]
    pub assertion_expression: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
}

impl TestAssertion {
    pub fn new(name: impl Into<String>, assertion_expression: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            assertion_expression: assertion_expression.into(),
            points: None,
        }
    }

    pub fn with_points(mut self, points: f64) -> Self {
        self.points = Some(points);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub name: String,
    pub passed: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
}

impl TestOutcome {
    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            points: None,
        }
    }
}

/// An exception raised by guest code, as reported by the interpreter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestError {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub traceback: String,
}

impl GuestError {
    /// Raw human readable text: the formatted traceback when the interpreter
    /// produced one, otherwise `Kind: message`.
    pub fn raw_text(&self) -> String {
        if !self.traceback.trim().is_empty() {
            return self.traceback.clone();
        }
        if self.message.is_empty() {
            self.kind.clone()
        } else {
            format!("{}: {}", self.kind, self.message)
        }
    }
}

/// Result of evaluating a program in the shared global namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Evaluation {
    /// Program completed; carries the value of a trailing expression, if any.
    Returned(Option<String>),
    /// Program raised.
    Raised(GuestError),
}
