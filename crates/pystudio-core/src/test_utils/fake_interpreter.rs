// src/test_utils/fake_interpreter.rs
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core_types::{CapturedOutput, Evaluation, GuestError};
use crate::errors::StudioError;
use crate::interpreter::{Interpreter, InterpreterLauncher};

/// Scripted result of one `execute` call on a [`FakeInterpreter`].
#[derive(Debug, Clone)]
pub struct FakeStep {
    pub evaluation: Result<Evaluation, StudioError>,
    pub stdout: String,
    pub stderr: String,
}

impl FakeStep {
    pub fn returns(value: Option<&str>) -> Self {
        Self {
            evaluation: Ok(Evaluation::Returned(value.map(str::to_string))),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn raises(kind: &str, message: &str, traceback: &str) -> Self {
        Self {
            evaluation: Ok(Evaluation::Raised(GuestError {
                kind: kind.to_string(),
                message: message.to_string(),
                traceback: traceback.to_string(),
            })),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn fails(error: StudioError) -> Self {
        Self {
            evaluation: Err(error),
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn with_stdout(mut self, stdout: &str) -> Self {
        self.stdout = stdout.to_string();
        self
    }

    pub fn with_stderr(mut self, stderr: &str) -> Self {
        self.stderr = stderr.to_string();
        self
    }
}

/// In-memory interpreter that replays [`FakeStep`]s and records every call.
pub struct FakeInterpreter {
    steps: Mutex<VecDeque<FakeStep>>,
    calls: Mutex<Vec<String>>,
    sources: Mutex<Vec<String>>,
    inputs: Mutex<Vec<Vec<String>>>,
    buffer: Mutex<Option<CapturedOutput>>,
    delay: Mutex<Option<Duration>>,
    alive: AtomicBool,
    fail_install: AtomicBool,
    fail_restore: AtomicBool,
}

impl FakeInterpreter {
    pub fn new() -> Self {
        Self {
            steps: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            sources: Mutex::new(Vec::new()),
            inputs: Mutex::new(Vec::new()),
            buffer: Mutex::new(None),
            delay: Mutex::new(None),
            alive: AtomicBool::new(true),
            fail_install: AtomicBool::new(false),
            fail_restore: AtomicBool::new(false),
        }
    }

    pub fn push(&self, step: FakeStep) -> &Self {
        self.steps.lock().unwrap().push_back(step);
        self
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn fail_install(&self) {
        self.fail_install.store(true, Ordering::SeqCst);
    }

    pub fn fail_restore(&self) {
        self.fail_restore.store(true, Ordering::SeqCst);
    }

    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sources(&self) -> Vec<String> {
        self.sources.lock().unwrap().clone()
    }

    pub fn inputs(&self) -> Vec<Vec<String>> {
        self.inputs.lock().unwrap().clone()
    }

    pub fn is_installed(&self) -> bool {
        self.buffer.lock().unwrap().is_some()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

impl Default for FakeInterpreter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Interpreter for FakeInterpreter {
    async fn execute(&self, source: &str) -> Result<Evaluation, StudioError> {
        self.record("execute");
        self.sources.lock().unwrap().push(source.to_string());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| FakeStep::returns(None));
        if let Some(buffer) = self.buffer.lock().unwrap().as_mut() {
            buffer.stdout.push_str(&step.stdout);
            buffer.stderr.push_str(&step.stderr);
        }
        step.evaluation
    }

    async fn install_io(&self, inputs: &[String]) -> Result<(), StudioError> {
        self.record("install");
        if self.fail_install.load(Ordering::SeqCst) {
            return Err(StudioError::SandboxError("install refused".to_string()));
        }
        self.inputs.lock().unwrap().push(inputs.to_vec());
        *self.buffer.lock().unwrap() = Some(CapturedOutput::default());
        Ok(())
    }

    async fn collect_io(&self) -> Result<CapturedOutput, StudioError> {
        self.record("collect");
        self.buffer
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| StudioError::SandboxError("no sandbox installed".to_string()))
    }

    async fn restore_io(&self) -> Result<(), StudioError> {
        self.record("restore");
        if self.fail_restore.load(Ordering::SeqCst) {
            return Err(StudioError::SandboxError("restore refused".to_string()));
        }
        *self.buffer.lock().unwrap() = None;
        Ok(())
    }

    fn version(&self) -> &str {
        "3.12.0"
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

/// Launcher handing out [`FakeInterpreter`]s while counting boots.
pub struct CountingLauncher {
    launches: AtomicU64,
    delay: Option<Duration>,
    fail_first: u64,
    fixed: Option<Arc<FakeInterpreter>>,
    launched: Mutex<Vec<Arc<FakeInterpreter>>>,
}

impl CountingLauncher {
    pub fn new() -> Self {
        Self {
            launches: AtomicU64::new(0),
            delay: None,
            fail_first: 0,
            fixed: None,
            launched: Mutex::new(Vec::new()),
        }
    }

    /// Every launch returns `interpreter`.
    pub fn with_interpreter(interpreter: Arc<FakeInterpreter>) -> Self {
        Self {
            fixed: Some(interpreter),
            ..Self::new()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_first(mut self, attempts: u64) -> Self {
        self.fail_first = attempts;
        self
    }

    pub fn launches(&self) -> u64 {
        self.launches.load(Ordering::SeqCst)
    }

    pub fn last(&self) -> Option<Arc<FakeInterpreter>> {
        self.launched.lock().unwrap().last().cloned()
    }
}

impl Default for CountingLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InterpreterLauncher for CountingLauncher {
    async fn launch(&self) -> Result<Arc<dyn Interpreter>, StudioError> {
        let attempt = self.launches.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if attempt <= self.fail_first {
            return Err(StudioError::InterpreterUnavailable(format!(
                "boot attempt {} failed",
                attempt
            )));
        }
        let interpreter = self
            .fixed
            .clone()
            .unwrap_or_else(|| Arc::new(FakeInterpreter::new()));
        self.launched.lock().unwrap().push(interpreter.clone());
        Ok(interpreter)
    }
}
