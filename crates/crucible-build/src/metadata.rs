//! Run metadata persisted beside a successful build's artifacts.

use crucible_core::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the metadata record inside an artifact directory.
pub const METADATA_FILE: &str = "run-metadata.json";

/// Console vs. GUI classification governing the execution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppModel {
    #[default]
    Console,
    Gui,
}

/// Small record written once at artifact-copy time and read by the
/// execution runner to decide its policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub app_model: AppModel,
    pub target_framework: String,
    pub output_kind: String,
    #[serde(default)]
    pub use_windows_forms: bool,
    #[serde(default)]
    pub use_wpf: bool,
}

impl RunMetadata {
    /// Writes the record into `dir` as JSON.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.join(METADATA_FILE), raw)?;
        Ok(())
    }

    /// Loads the record from `dir`, if present and well-formed.
    pub fn load(dir: &Path) -> Option<Self> {
        let raw = std::fs::read_to_string(dir.join(METADATA_FILE)).ok()?;
        serde_json::from_str(&raw).ok()
    }
}
