//! Execution side of the pipeline: running compiled binaries under the
//! app-model policy matrix.

pub mod runner;

pub use runner::{BinaryLauncher, ExecutionResult, ExecutionRunner, HostBinaryLauncher, UiSession};
