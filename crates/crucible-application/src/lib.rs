//! Application layer: role agent implementations and the pipeline driver
//! that orchestrates one specification through the role rotation.

pub mod agents;
pub mod pipeline;

pub use agents::{BuildRoleAgent, CommandRoleAgent, RunRoleAgent};
pub use pipeline::{Pipeline, PipelineReport};
