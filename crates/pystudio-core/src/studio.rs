//! Session State Facade.
//!
//! [`Studio`] is what the rest of the application talks to. It holds the
//! editor's code and the current section's tests, exposes `is_running` and
//! `is_testing` so a UI can disable its buttons, and keeps the latest results
//! for whoever renders or stores them.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::{Arc, RwLock, RwLockWriteGuard};

use crate::core_types::{ExecutionResult, TestAssertion, TestOutcome};
use crate::engine::Engine;
use crate::errors::StudioError;

/// Serializable copy of the facade's fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudioState {
    pub code: String,
    pub tests: Vec<TestAssertion>,
    pub is_running: bool,
    pub is_testing: bool,
    pub output: String,
    pub stderr: String,
    /// Normalized error of the last run's program.
    pub error: Option<String>,
    /// Runtime failure ("couldn't start Python"), kept apart from program errors.
    pub fatal_error: Option<String>,
    pub test_results: Vec<TestOutcome>,
    pub last_run: Option<ExecutionResult>,
}

/// Collaborator notified after completed operations, e.g. a persistence layer.
#[async_trait]
pub trait StudioObserver: Send + Sync {
    async fn on_run(&self, _code: &str, _result: &ExecutionResult) {}

    async fn on_test(&self, _code: &str, _outcomes: &[TestOutcome]) {}
}

#[derive(Default)]
struct Inner {
    state: StudioState,
    running: usize,
    testing: usize,
}

impl Inner {
    fn sync_flags(&mut self) {
        self.state.is_running = self.running > 0;
        self.state.is_testing = self.testing > 0;
    }
}

#[derive(Clone, Copy)]
enum Flag {
    Running,
    Testing,
}

/// Clears its flag when dropped, including when the operation is cancelled.
struct FlagGuard {
    inner: Arc<RwLock<Inner>>,
    flag: Flag,
}

impl FlagGuard {
    fn raise(inner: &Arc<RwLock<Inner>>, flag: Flag) -> Self {
        {
            let mut guard = write(inner);
            match flag {
                Flag::Running => guard.running += 1,
                Flag::Testing => guard.testing += 1,
            }
            guard.sync_flags();
        }
        Self {
            inner: inner.clone(),
            flag,
        }
    }
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        let mut guard = write(&self.inner);
        match self.flag {
            Flag::Running => guard.running = guard.running.saturating_sub(1),
            Flag::Testing => guard.testing = guard.testing.saturating_sub(1),
        }
        guard.sync_flags();
    }
}

fn write(inner: &RwLock<Inner>) -> RwLockWriteGuard<'_, Inner> {
    inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Studio {
    engine: Arc<Engine>,
    inner: Arc<RwLock<Inner>>,
    observers: Vec<Arc<dyn StudioObserver>>,
}

impl Studio {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self {
            engine,
            inner: Arc::new(RwLock::new(Inner::default())),
            observers: Vec::new(),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn StudioObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn snapshot(&self) -> StudioState {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .state
            .clone()
    }

    pub fn set_code(&self, code: impl Into<String>) {
        write(&self.inner).state.code = code.into();
    }

    pub fn set_tests(&self, tests: Vec<TestAssertion>) {
        write(&self.inner).state.tests = tests;
    }

    pub fn is_running(&self) -> bool {
        self.snapshot().is_running
    }

    pub fn is_testing(&self) -> bool {
        self.snapshot().is_testing
    }

    /// Runs the held code, replacing it with `code` first when given.
    pub async fn run(
        &self,
        code: Option<String>,
        inputs: Vec<String>,
    ) -> Result<ExecutionResult, StudioError> {
        let _flag = FlagGuard::raise(&self.inner, Flag::Running);
        let code = {
            let mut guard = write(&self.inner);
            if let Some(code) = code {
                guard.state.code = code;
            }
            guard.state.output.clear();
            guard.state.stderr.clear();
            guard.state.error = None;
            guard.state.fatal_error = None;
            guard.state.last_run = None;
            guard.state.code.clone()
        };

        match self.engine.run_source(&code, &inputs).await {
            Ok(result) => {
                {
                    let mut guard = write(&self.inner);
                    guard.state.output = result.stdout.clone();
                    guard.state.stderr = result.stderr.clone();
                    guard.state.error = result.error.clone();
                    guard.state.last_run = Some(result.clone());
                }
                for observer in &self.observers {
                    observer.on_run(&code, &result).await;
                }
                Ok(result)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    /// Grades the held code against the held tests.
    ///
    /// With no tests this is a no-op returning an empty list.
    pub async fn test(
        &self,
        code: Option<String>,
        inputs: Vec<String>,
    ) -> Result<Vec<TestOutcome>, StudioError> {
        let (code, tests) = {
            let mut guard = write(&self.inner);
            if let Some(code) = code {
                guard.state.code = code;
            }
            (guard.state.code.clone(), guard.state.tests.clone())
        };
        if tests.is_empty() {
            return Ok(Vec::new());
        }

        let _flag = FlagGuard::raise(&self.inner, Flag::Testing);
        {
            let mut guard = write(&self.inner);
            guard.state.test_results.clear();
            guard.state.fatal_error = None;
        }

        match self.engine.grade(&code, &tests, &inputs).await {
            Ok(outcomes) => {
                write(&self.inner).state.test_results = outcomes.clone();
                for observer in &self.observers {
                    observer.on_test(&code, &outcomes).await;
                }
                Ok(outcomes)
            }
            Err(e) => {
                self.record_failure(&e);
                Err(e)
            }
        }
    }

    fn record_failure(&self, error: &StudioError) {
        if error.is_unavailable() {
            log::error!("Runtime failure: {}", error);
            write(&self.inner).state.fatal_error = Some(error.to_string());
        } else {
            log::warn!("Operation not started: {}", error);
        }
    }
}
