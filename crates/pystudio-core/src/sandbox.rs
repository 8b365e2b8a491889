//! I/O Capture Sandbox.
//!
//! Installing a sandbox points the guest's stdout/stderr at fresh buffers and
//! replaces `input()` with a reader over the queued mock inputs. The sandbox
//! holds the gate permit, so no other operation can start until the original
//! bindings are back in place.

use std::sync::Arc;

use crate::core_types::{CapturedOutput, Evaluation};
use crate::errors::StudioError;
use crate::gate::GatePermit;
use crate::interpreter::Interpreter;

pub struct IoSandbox {
    interpreter: Arc<dyn Interpreter>,
    permit: Option<GatePermit>,
    restored: bool,
}

impl IoSandbox {
    pub async fn install(
        interpreter: Arc<dyn Interpreter>,
        permit: GatePermit,
        inputs: &[String],
    ) -> Result<Self, StudioError> {
        if let Err(e) = interpreter.install_io(inputs).await {
            log::error!("Sandbox install failed: {}", e);
            if let Err(restore_err) = interpreter.restore_io().await {
                log::error!("Restore after failed install also failed: {}", restore_err);
            }
            return Err(e);
        }
        log::debug!("Sandbox installed with {} queued input(s)", inputs.len());
        Ok(Self {
            interpreter,
            permit: Some(permit),
            restored: false,
        })
    }

    pub async fn execute(&self, source: &str) -> Result<Evaluation, StudioError> {
        self.interpreter.execute(source).await
    }

    /// Output written since install.
    pub async fn capture(&self) -> Result<CapturedOutput, StudioError> {
        self.interpreter.collect_io().await
    }

    /// Puts the original bindings back, then releases the gate.
    pub async fn restore(mut self) -> Result<(), StudioError> {
        let result = self.interpreter.restore_io().await;
        self.restored = true;
        if let Err(e) = &result {
            log::error!("Sandbox restore failed: {}", e);
        }
        self.permit.take();
        result
    }
}

impl Drop for IoSandbox {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        let interpreter = self.interpreter.clone();
        let permit = self.permit.take();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                log::warn!("Sandbox dropped before restore; restoring in the background");
                handle.spawn(async move {
                    if let Err(e) = interpreter.restore_io().await {
                        log::error!("Background sandbox restore failed: {}", e);
                    }
                    drop(permit);
                });
            }
            Err(_) => {
                log::error!("Sandbox dropped outside a runtime; guest I/O bindings were not restored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::OverlapPolicy;
    use crate::gate::{ExecutionGate, OperationKind};
    use crate::test_utils::{FakeInterpreter, FakeStep};

    fn inputs(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn test_install_capture_restore() {
        let fake = Arc::new(FakeInterpreter::new());
        fake.push(FakeStep::returns(None).with_stdout("hello\n"));
        let gate = ExecutionGate::new(OverlapPolicy::Queue);

        let permit = gate.enter(OperationKind::Run).await.unwrap();
        let sandbox = IoSandbox::install(fake.clone(), permit, &inputs(&["a", "b"]))
            .await
            .unwrap();
        assert!(fake.is_installed());

        sandbox.execute("print('hello')").await.unwrap();
        let output = sandbox.capture().await.unwrap();
        assert_eq!(output.stdout, "hello\n");
        assert!(gate.is_busy());

        sandbox.restore().await.unwrap();
        assert!(!fake.is_installed());
        assert!(!gate.is_busy());
        assert_eq!(fake.calls(), vec!["install", "execute", "collect", "restore"]);
        assert_eq!(fake.inputs(), vec![inputs(&["a", "b"])]);
    }

    #[tokio::test]
    async fn test_failed_install_restores_and_releases() {
        let fake = Arc::new(FakeInterpreter::new());
        fake.fail_install();
        let gate = ExecutionGate::new(OverlapPolicy::Reject);

        let permit = gate.enter(OperationKind::Run).await.unwrap();
        let result = IoSandbox::install(fake.clone(), permit, &[]).await;

        assert!(matches!(result, Err(StudioError::SandboxError(_))));
        assert_eq!(fake.calls(), vec!["install", "restore"]);
        assert!(!gate.is_busy());
    }

    #[tokio::test]
    async fn test_restore_failure_is_reported_and_gate_released() {
        let fake = Arc::new(FakeInterpreter::new());
        fake.fail_restore();
        let gate = ExecutionGate::new(OverlapPolicy::Reject);

        let permit = gate.enter(OperationKind::Grade).await.unwrap();
        let sandbox = IoSandbox::install(fake.clone(), permit, &[]).await.unwrap();
        assert!(sandbox.restore().await.is_err());
        assert!(gate.enter(OperationKind::Run).await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_sandbox_restores_before_next_operation() {
        let fake = Arc::new(FakeInterpreter::new());
        let gate = ExecutionGate::new(OverlapPolicy::Queue);

        let permit = gate.enter(OperationKind::Run).await.unwrap();
        let sandbox = IoSandbox::install(fake.clone(), permit, &[]).await.unwrap();
        drop(sandbox);

        // The next operation only gets in once the background restore is done.
        let _next = gate.enter(OperationKind::Run).await.unwrap();
        assert!(!fake.is_installed());
        assert_eq!(fake.calls().last().map(String::as_str), Some("restore"));
    }

    #[tokio::test]
    async fn test_cancelled_execution_still_restores() {
        let fake = Arc::new(FakeInterpreter::new());
        fake.set_delay(std::time::Duration::from_secs(60));
        let gate = ExecutionGate::new(OverlapPolicy::Queue);

        let operation = {
            let fake = fake.clone();
            let gate = gate.clone();
            async move {
                let permit = gate.enter(OperationKind::Run).await?;
                let sandbox = IoSandbox::install(fake, permit, &[]).await?;
                sandbox.execute("while True: pass").await?;
                sandbox.restore().await
            }
        };
        let timed = tokio::time::timeout(std::time::Duration::from_millis(20), operation).await;
        assert!(timed.is_err());

        let _next = gate.enter(OperationKind::Grade).await.unwrap();
        assert!(!fake.is_installed());
    }
}
