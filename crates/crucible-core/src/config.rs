//! Pipeline configuration.
//!
//! Every tuning constant the pipeline depends on lives here as an explicit
//! field with a serde default, so a run can be reconfigured from a TOML file
//! without touching call sites.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration for a pipeline run.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub build: BuildConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub agents: AgentCommands,
}

impl PipelineConfig {
    /// Loads configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

/// Turn-scheduling and termination settings.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct WorkflowConfig {
    /// Hard ceiling on full role cycles before the run is forcibly stopped.
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,
    /// Upper bound on the length of a synthesized repair directive.
    #[serde(default = "default_directive_max_len")]
    pub directive_max_len: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_cycles: default_max_cycles(),
            directive_max_len: default_directive_max_len(),
        }
    }
}

/// Compilation settings.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct BuildConfig {
    /// Build tool executable, invoked as `<tool> build`.
    #[serde(default = "default_build_tool")]
    pub tool: String,
    /// Window within which an identical build request is served from cache.
    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,
    /// Root directory for permanent, timestamped artifact directories.
    #[serde(default = "default_artifact_root")]
    pub artifact_root: PathBuf,
    /// Target framework used when a request does not specify one.
    #[serde(default = "default_target_framework")]
    pub default_target_framework: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            tool: default_build_tool(),
            dedup_window_secs: default_dedup_window_secs(),
            artifact_root: default_artifact_root(),
            default_target_framework: default_target_framework(),
        }
    }
}

/// Executable launch settings.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ExecutionConfig {
    /// Timeout for the launched binary.
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// Opt-in for the console-attached retry when redirected output breaks
    /// console-handle APIs. Off by default: the retry loses captured stdout.
    #[serde(default)]
    pub interactive_fallback: bool,
    /// Runtime host used to launch portable (`.dll`) binaries.
    #[serde(default = "default_runtime_host")]
    pub runtime_host: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: default_run_timeout_secs(),
            interactive_fallback: false,
            runtime_host: default_runtime_host(),
        }
    }
}

/// External commands backing the language-model roles.
///
/// The generation and validation roles are external collaborators; the
/// pipeline only sees the text they produce.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct AgentCommands {
    /// Command (argv) for the Generate role.
    #[serde(default)]
    pub generate: Vec<String>,
    /// Command (argv) for the Validate role.
    #[serde(default)]
    pub validate: Vec<String>,
}

fn default_max_cycles() -> u32 {
    15
}

fn default_directive_max_len() -> usize {
    240
}

fn default_build_tool() -> String {
    "dotnet".to_string()
}

fn default_dedup_window_secs() -> u64 {
    15
}

fn default_artifact_root() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_target_framework() -> String {
    "net8.0".to_string()
}

fn default_run_timeout_secs() -> u64 {
    8
}

fn default_runtime_host() -> String {
    "dotnet".to_string()
}
