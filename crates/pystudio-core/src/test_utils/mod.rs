// src/test_utils/mod.rs
pub mod fake_interpreter;

pub use fake_interpreter::{CountingLauncher, FakeInterpreter, FakeStep};
