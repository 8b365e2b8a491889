//! Execution and grading engine for an interactive Python learning studio.
//!
//! User-submitted programs run against one long-lived CPython interpreter
//! with a single shared global namespace. The crate keeps successive runs
//! from seeing each other's output or patched builtins and reports program
//! failures as data rather than errors.
//!
//! # Architecture Overview
//!
//! - **Interpreter session** ([`session`]): lazy, shared boot of the one interpreter
//! - **Execution gate** ([`gate`]): at most one operation touches the interpreter
//! - **I/O capture sandbox** ([`sandbox`]): captured stdout/stderr and scripted `input()`
//! - **Run** ([`runner`]) and **Grade** ([`grader`]) protocols on [`Engine`]
//! - **Result normalization** ([`normalize`]): runtime frames removed from tracebacks
//! - **Session state facade** ([`studio`]): what a UI or storage layer talks to
//! - **Interpreter backend** ([`interpreter`]): CPython child process and its wire protocol

pub mod config;
pub mod core_types;
pub mod engine;
pub mod errors;
pub mod gate;
pub mod grader;
pub mod interpreter;
pub mod normalize;
pub mod runner;
pub mod sandbox;
pub mod session;
pub mod studio;

pub use config::*;
pub use core_types::*;
pub use engine::{Engine, RuntimeStatus};
pub use errors::StudioError;
pub use gate::{ExecutionGate, GatePermit, OperationKind};
pub use interpreter::{Interpreter, InterpreterLauncher, PythonLauncher};
pub use normalize::{normalize_error, ErrorNormalizer};
pub use sandbox::IoSandbox;
pub use session::{InterpreterSession, SessionState};
pub use studio::{Studio, StudioObserver, StudioState};

#[cfg(test)]
pub mod test_utils;
