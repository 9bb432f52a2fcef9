//! Execution of compiled binaries under the app-model policy matrix.

use async_trait::async_trait;
use crucible_build::metadata::{AppModel, RunMetadata};
use crucible_core::audit::AuditCounters;
use crucible_core::config::ExecutionConfig;
use crucible_core::Result;
use crucible_process::{ExitDisposition, ProcessOutput, ProcessRequest, ProcessRunner};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Error-stream fragments that mark a crashed run.
const RUNTIME_FAILURE_SIGNATURES: [&str; 3] =
    ["unhandled exception", "exception:", "fatal"];

/// Error-stream fragments that mark a console-handle failure: cursor and
/// window APIs a program cannot use while its output is redirected.
const CONSOLE_HANDLE_SIGNATURES: [&str; 5] = [
    "handle is invalid",
    "console output has been redirected",
    "setcursorposition",
    "setwindowsize",
    "setbuffersize",
];

/// UI-session state for GUI app models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiSession {
    /// Alive and stable at timeout; reclassified as success.
    Started,
    /// Exited on its own before the timeout.
    Completed,
}

/// Outcome of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    pub disposition: ExitDisposition,
    pub stdout: String,
    pub stderr: String,
    /// True when the console-attached retry ran; its stdout is lost.
    pub interactive_fallback_used: bool,
    pub ui_session: Option<UiSession>,
    /// Human-readable caveat or actionable hint attached to the result.
    pub limitation: Option<String>,
}

impl ExecutionResult {
    /// Renders the captured stdout for reporting. Whitespace-only output
    /// is summarized by counts instead of silently discarded: it can be a
    /// legitimate cursor/color rendering that degrades to blanks once
    /// redirected.
    pub fn output_summary(&self) -> String {
        if self.stdout.is_empty() {
            return "(no output captured)".to_string();
        }
        if self.stdout.chars().all(char::is_whitespace) {
            return format!(
                "(whitespace-only output: {} chars, {} lines; possibly cursor/color \
                 rendering degraded by redirection)",
                self.stdout.chars().count(),
                self.stdout.lines().count()
            );
        }
        self.stdout.clone()
    }
}

/// The launch capability, black-boxed behind a trait so the policy matrix
/// is testable without real binaries.
#[async_trait]
pub trait BinaryLauncher: Send + Sync {
    /// Launches the binary. `interactive` runs console-attached (stdout
    /// not captured).
    async fn launch(
        &self,
        binary: &Path,
        timeout: Duration,
        interactive: bool,
    ) -> Result<ProcessOutput>;
}

/// Real launcher: portable assemblies go through the runtime host,
/// apphost executables run directly.
pub struct HostBinaryLauncher {
    runtime_host: String,
    runner: ProcessRunner,
}

impl HostBinaryLauncher {
    pub fn new(runtime_host: impl Into<String>) -> Self {
        Self {
            runtime_host: runtime_host.into(),
            runner: ProcessRunner::new(),
        }
    }
}

#[async_trait]
impl BinaryLauncher for HostBinaryLauncher {
    async fn launch(
        &self,
        binary: &Path,
        timeout: Duration,
        interactive: bool,
    ) -> Result<ProcessOutput> {
        let request = if binary.extension().is_some_and(|ext| ext == "dll") {
            ProcessRequest::new(&self.runtime_host).arg(binary.to_string_lossy())
        } else {
            ProcessRequest::new(binary.to_string_lossy())
        };
        self.runner
            .run(
                request
                    .timeout(timeout)
                    .capture(!interactive)
                    .kill_tree(interactive),
            )
            .await
    }
}

/// Runs compiled binaries with the mode-specific timeout policy.
pub struct ExecutionRunner {
    config: ExecutionConfig,
    audit: Arc<AuditCounters>,
    launcher: Arc<dyn BinaryLauncher>,
}

impl ExecutionRunner {
    pub fn new(
        config: ExecutionConfig,
        audit: Arc<AuditCounters>,
        launcher: Arc<dyn BinaryLauncher>,
    ) -> Self {
        Self {
            config,
            audit,
            launcher,
        }
    }

    /// Runs `binary` under the policy for its app model.
    ///
    /// The effective model comes from the explicit hint, else the metadata
    /// record beside the binary, else defaults to console.
    pub async fn run(&self, binary: &Path, hint: Option<AppModel>) -> Result<ExecutionResult> {
        self.audit.record_execute();
        let app_model = hint
            .or_else(|| {
                binary
                    .parent()
                    .and_then(RunMetadata::load)
                    .map(|m| m.app_model)
            })
            .unwrap_or_default();
        let timeout = Duration::from_secs(self.config.run_timeout_secs);

        tracing::info!(binary = %binary.display(), ?app_model, "launching binary");
        let output = self.launcher.launch(binary, timeout, false).await?;

        match app_model {
            AppModel::Console => self.assess_console(binary, output, timeout).await,
            AppModel::Gui => Ok(assess_gui(output)),
        }
    }

    async fn assess_console(
        &self,
        binary: &Path,
        output: ProcessOutput,
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        match output.disposition {
            ExitDisposition::Exited(0) => Ok(plain_result(output, true)),
            ExitDisposition::TimedOut => {
                tracing::warn!(binary = %binary.display(), "console program timed out");
                Ok(plain_result(output, false))
            }
            ExitDisposition::Exited(_) if has_signature(&output.stderr, &CONSOLE_HANDLE_SIGNATURES) => {
                if self.config.interactive_fallback {
                    self.retry_interactive(binary, output, timeout).await
                } else {
                    let mut result = plain_result(output, false);
                    result.limitation = Some(
                        "the program needs a real console for cursor/window APIs; \
                         enable the interactive fallback to re-run it console-attached \
                         (captured stdout will be lost)"
                            .to_string(),
                    );
                    Ok(result)
                }
            }
            ExitDisposition::Exited(_) => Ok(plain_result(output, false)),
        }
    }

    /// One console-attached retry for programs whose console-handle APIs
    /// broke under redirection.
    async fn retry_interactive(
        &self,
        binary: &Path,
        captured: ProcessOutput,
        timeout: Duration,
    ) -> Result<ExecutionResult> {
        tracing::info!(binary = %binary.display(), "console-handle failure, retrying attached");
        let retry = self.launcher.launch(binary, timeout, true).await?;

        let success = match retry.disposition {
            ExitDisposition::Exited(0) => true,
            ExitDisposition::TimedOut => !has_signature(&retry.stderr, &RUNTIME_FAILURE_SIGNATURES),
            ExitDisposition::Exited(_) => false,
        };

        Ok(ExecutionResult {
            success,
            disposition: retry.disposition,
            // Stdout is from the first, captured attempt; the attached run
            // writes straight to the console.
            stdout: captured.stdout,
            stderr: retry.stderr,
            interactive_fallback_used: true,
            ui_session: None,
            limitation: Some(
                "ran console-attached after a console-handle failure; stdout of the \
                 attached run was not captured"
                    .to_string(),
            ),
        })
    }
}

/// GUI policy: a timeout with a clean error stream is a started, stable
/// UI session, not a failure.
fn assess_gui(output: ProcessOutput) -> ExecutionResult {
    match output.disposition {
        ExitDisposition::Exited(_) => {
            let mut result = plain_result(output, true);
            result.ui_session = Some(UiSession::Completed);
            result
        }
        ExitDisposition::TimedOut => {
            let crashed = has_signature(&output.stderr, &RUNTIME_FAILURE_SIGNATURES);
            let mut result = plain_result(output, !crashed);
            result.ui_session = (!crashed).then_some(UiSession::Started);
            result
        }
    }
}

fn plain_result(output: ProcessOutput, success: bool) -> ExecutionResult {
    ExecutionResult {
        success,
        disposition: output.disposition,
        stdout: output.stdout,
        stderr: output.stderr,
        interactive_fallback_used: false,
        ui_session: None,
        limitation: None,
    }
}

fn has_signature(stderr: &str, signatures: &[&str]) -> bool {
    let lower = stderr.to_lowercase();
    signatures.iter().any(|s| lower.contains(s))
}
