use anyhow::{Context, Result};
use crucible_core::config::PipelineConfig;
use std::path::PathBuf;

pub mod doctor;
pub mod run;

pub(crate) fn load_config(path: Option<PathBuf>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(&path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}
