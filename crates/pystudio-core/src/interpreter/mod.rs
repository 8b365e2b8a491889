//! Embedded interpreter seam.
//!
//! The engine never talks to Python directly. It drives an [`Interpreter`]:
//! one long-lived instance with a single global namespace, plus the three
//! primitives the I/O sandbox needs to capture and restore the guest's
//! standard streams and `input()`. [`InterpreterLauncher`] boots new instances
//! for the session manager.

use async_trait::async_trait;
use std::sync::Arc;

use crate::core_types::{CapturedOutput, Evaluation};
use crate::errors::StudioError;

pub mod process;
pub mod protocol;

pub use process::{PythonLauncher, PythonProcess};

#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Runs `source` as a full program in the shared global namespace.
    ///
    /// A guest exception is `Ok(Evaluation::Raised(..))`; `Err` is reserved for
    /// failures of the interpreter itself.
    async fn execute(&self, source: &str) -> Result<Evaluation, StudioError>;

    /// Redirects stdout/stderr to fresh buffers and replaces `input()` with a
    /// reader over `inputs`.
    async fn install_io(&self, inputs: &[String]) -> Result<(), StudioError>;

    /// Reads the buffers filled since the last `install_io`.
    async fn collect_io(&self) -> Result<CapturedOutput, StudioError>;

    /// Puts back the bindings saved by `install_io`.
    async fn restore_io(&self) -> Result<(), StudioError>;

    /// Version string reported by the interpreter at boot.
    fn version(&self) -> &str;

    fn is_alive(&self) -> bool {
        true
    }
}

#[async_trait]
pub trait InterpreterLauncher: Send + Sync {
    async fn launch(&self) -> Result<Arc<dyn Interpreter>, StudioError>;
}
