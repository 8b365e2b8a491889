//! Configuration module for the execution engine
//!
//! Configuration is read from YAML and then overridden from the environment,
//! so a deployment can point at a different interpreter without editing files.

pub mod loader;
pub mod types;

pub use loader::*;
pub use types::*;


use crate::errors::StudioError;
use std::path::Path;

/// Load a configuration from a YAML file
pub async fn load_config<P: AsRef<Path>>(path: P) -> Result<StudioConfig, StudioError> {
    ConfigLoader::from_file(path).await
}
