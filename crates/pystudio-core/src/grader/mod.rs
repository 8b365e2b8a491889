//! Grading Protocol (Test).
//!
//! The submission and every assertion run as one guest program inside a
//! sandbox. Per-assertion failures are recorded by the program itself; this
//! module turns its JSON report into [`TestOutcome`]s and joins lesson points
//! onto them by name.

pub mod script;

pub use script::{build_test_script, py_string_literal};

use std::collections::HashMap;
use std::sync::Arc;

use crate::core_types::{Evaluation, TestAssertion, TestOutcome, FRAMEWORK_ERROR_OUTCOME};
use crate::engine::Engine;
use crate::errors::StudioError;
use crate::gate::{GatePermit, OperationKind};
use crate::interpreter::Interpreter;
use crate::sandbox::IoSandbox;

impl Engine {
    /// Grades `source` against `assertions`.
    ///
    /// Always resolves to outcomes once the interpreter is available: guest
    /// failures of any kind, including a grading program that cannot run, are
    /// reported as outcomes. Only failing to obtain the interpreter (or the
    /// gate, under the reject policy) is an `Err`.
    pub async fn grade(
        &self,
        source: &str,
        assertions: &[TestAssertion],
        inputs: &[String],
    ) -> Result<Vec<TestOutcome>, StudioError> {
        if assertions.is_empty() {
            return Ok(Vec::new());
        }

        let permit = self.gate.enter(OperationKind::Grade).await?;
        let interpreter = self.session.acquire().await?;
        let script = build_test_script(source, assertions);
        log::debug!("Grading {} assertion(s)", assertions.len());

        let outcomes = match evaluate(interpreter, permit, &script, inputs).await {
            Ok(Evaluation::Returned(Some(report))) => match parse_report(&report) {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    log::error!("Unreadable grading report: {}", e);
                    vec![framework_error(format!("Could not read test results: {}", e))]
                }
            },
            Ok(Evaluation::Returned(None)) => {
                vec![framework_error("Grading program produced no results")]
            }
            Ok(Evaluation::Raised(guest)) => {
                vec![framework_error(self.normalizer.normalize(&guest.raw_text()))]
            }
            Err(e) => {
                log::error!("Grading failed in the runtime: {}", e);
                vec![framework_error(e.to_string())]
            }
        };

        let passed = outcomes.iter().filter(|o| o.passed).count();
        log::info!("Grading finished: {}/{} passed", passed, outcomes.len());
        Ok(attach_points(outcomes, assertions))
    }
}

async fn evaluate(
    interpreter: Arc<dyn Interpreter>,
    permit: GatePermit,
    script: &str,
    inputs: &[String],
) -> Result<Evaluation, StudioError> {
    let sandbox = IoSandbox::install(interpreter, permit, inputs).await?;
    let evaluation = sandbox.execute(script).await;
    let restored = sandbox.restore().await;
    let evaluation = evaluation?;
    restored?;
    Ok(evaluation)
}

fn framework_error(message: impl Into<String>) -> TestOutcome {
    TestOutcome::failed(FRAMEWORK_ERROR_OUTCOME, message)
}

fn parse_report(report: &str) -> Result<Vec<TestOutcome>, serde_json::Error> {
    serde_json::from_str(report)
}

/// Copies `points` from the assertion with the same name. With duplicate
/// names the last declared assertion wins.
pub fn attach_points(outcomes: Vec<TestOutcome>, assertions: &[TestAssertion]) -> Vec<TestOutcome> {
    let points: HashMap<&str, Option<f64>> = assertions
        .iter()
        .map(|a| (a.name.as_str(), a.points))
        .collect();

    outcomes
        .into_iter()
        .map(|mut outcome| {
            outcome.points = points.get(outcome.name.as_str()).copied().flatten();
            outcome
        })
        .collect()
}
