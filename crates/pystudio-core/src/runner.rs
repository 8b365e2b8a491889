//! Execution Protocol (Run): execute a program and report what it printed.

use std::time::Instant;

use crate::core_types::{Evaluation, ExecutionRequest, ExecutionResult};
use crate::engine::Engine;
use crate::errors::StudioError;
use crate::gate::OperationKind;
use crate::sandbox::IoSandbox;

impl Engine {
    /// Runs `request` inside a fresh sandbox.
    ///
    /// A guest exception is reported in `ExecutionResult::error`. `Err` means
    /// the runtime itself failed; the sandbox is restored first either way.
    pub async fn run(&self, request: &ExecutionRequest) -> Result<ExecutionResult, StudioError> {
        let permit = self.gate.enter(OperationKind::Run).await?;
        let started = Instant::now();
        let interpreter = self.session.acquire().await?;
        let sandbox = IoSandbox::install(interpreter, permit, &request.mock_inputs).await?;

        let outcome = async {
            let evaluation = sandbox.execute(&request.source_text).await?;
            let output = sandbox.capture().await?;
            Ok::<_, StudioError>((evaluation, output))
        }
        .await;
        let elapsed = started.elapsed();

        let restored = sandbox.restore().await;
        let (evaluation, output) = outcome?;
        restored?;

        let error = match evaluation {
            Evaluation::Returned(_) => None,
            Evaluation::Raised(guest) => Some(self.normalizer.normalize(&guest.raw_text())),
        };
        log::info!(
            "Run finished in {:?} ({})",
            elapsed,
            if error.is_some() { "raised" } else { "ok" }
        );

        Ok(ExecutionResult {
            stdout: output.stdout,
            stderr: output.stderr,
            error,
            duration_ms: elapsed.as_millis() as u64,
        })
    }

    pub async fn run_source(&self, source: &str, inputs: &[String]) -> Result<ExecutionResult, StudioError> {
        self.run(&ExecutionRequest::new(source).with_inputs(inputs.to_vec()))
            .await
    }
}
