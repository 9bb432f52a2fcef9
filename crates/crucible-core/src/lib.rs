//! Domain layer for the Crucible pipeline: conversation model, marker
//! vocabulary, tool-call auditing, repair feedback and workflow management.

pub mod agent;
pub mod audit;
pub mod config;
pub mod conversation;
pub mod error;
pub mod markers;
pub mod repair;
pub mod workflow;

// Re-export common error type
pub use error::{CrucibleError, Result};
