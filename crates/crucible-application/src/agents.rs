//! Role agent implementations.
//!
//! Generate and Validate are external collaborators wrapped as commands;
//! Build and Run are tool-backed agents that invoke the local compile and
//! run capabilities and speak the marker vocabulary.

use async_trait::async_trait;
use crucible_build::CompilerService;
use crucible_core::agent::RoleAgent;
use crucible_core::conversation::{ConversationHistory, Role};
use crucible_core::markers;
use crucible_core::{CrucibleError, Result};
use crucible_execution::{ExecutionRunner, UiSession};
use crucible_process::ExitDisposition;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::process::Command;

/// Wraps an external command as a role.
///
/// The command receives the full conversation transcript as its last
/// argument and its stdout becomes the turn text.
pub struct CommandRoleAgent {
    role: Role,
    command: Vec<String>,
}

impl CommandRoleAgent {
    pub fn new(role: Role, command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            return Err(CrucibleError::config(format!(
                "no command configured for the {role} role"
            )));
        }
        Ok(Self { role, command })
    }

    /// Checks the configured program exists in PATH.
    pub async fn is_available(&self) -> Result<()> {
        #[cfg(unix)]
        let check_cmd = "which";
        #[cfg(windows)]
        let check_cmd = "where";

        let output = Command::new(check_cmd)
            .arg(&self.command[0])
            .output()
            .await
            .map_err(|e| {
                CrucibleError::agent(self.role.to_string(), format!("availability check failed: {e}"))
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(CrucibleError::agent(
                self.role.to_string(),
                format!("'{}' not found in PATH", self.command[0]),
            ))
        }
    }

    fn transcript(history: &ConversationHistory) -> String {
        let mut prompt = String::new();
        for turn in history.turns() {
            prompt.push_str(&format!("=== {}\n{}\n", turn.role, turn.content));
        }
        prompt
    }
}

#[async_trait]
impl RoleAgent for CommandRoleAgent {
    fn role(&self) -> Role {
        self.role
    }

    async fn take_turn(&self, history: &ConversationHistory) -> Result<String> {
        let transcript = Self::transcript(history);
        tracing::debug!(role = %self.role, chars = transcript.len(), "invoking role command");

        let output = Command::new(&self.command[0])
            .args(&self.command[1..])
            .arg(&transcript)
            .output()
            .await
            .map_err(|e| {
                CrucibleError::agent(
                    self.role.to_string(),
                    format!("failed to spawn '{}': {e}", self.command[0]),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CrucibleError::agent(
                self.role.to_string(),
                format!("command exited with {}: {}", output.status, stderr),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Tool-backed build role: normalizes the latest generation payload and
/// reports the real compile outcome.
pub struct BuildRoleAgent {
    compiler: Arc<CompilerService>,
    /// Diagnostics lines included in a failure turn beyond the reason.
    max_diagnostics: usize,
}

impl BuildRoleAgent {
    pub fn new(compiler: Arc<CompilerService>) -> Self {
        Self {
            compiler,
            max_diagnostics: 10,
        }
    }
}

#[async_trait]
impl RoleAgent for BuildRoleAgent {
    fn role(&self) -> Role {
        Role::Build
    }

    async fn take_turn(&self, history: &ConversationHistory) -> Result<String> {
        let Some(generated) = history.last_of(Role::Generate) else {
            return Ok("Nothing to build yet: no generation turn in the conversation.".to_string());
        };

        let result = self.compiler.compile_payload(&generated.content).await?;

        if result.success {
            let binary = result
                .binary_path
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            let artifacts = result
                .artifact_dir
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            Ok(format!(
                "{}\n{} {}\n{} {}",
                markers::BUILD_SUCCEEDED,
                markers::FIELD_BINARY,
                binary,
                markers::FIELD_ARTIFACTS,
                artifacts,
            ))
        } else {
            let reason = result
                .primary_error
                .unwrap_or_else(|| "build failed with no diagnostics".to_string());
            let mut text = format!("{}\n{} {}", markers::BUILD_FAILED, markers::FIELD_REASON, reason);
            for line in result.diagnostics.iter().take(self.max_diagnostics) {
                text.push('\n');
                text.push_str(line);
            }
            Ok(text)
        }
    }
}

/// Tool-backed run role: launches the binary reported by the latest build
/// turn and reports the real execution outcome.
pub struct RunRoleAgent {
    runner: Arc<ExecutionRunner>,
}

impl RunRoleAgent {
    pub fn new(runner: Arc<ExecutionRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl RoleAgent for RunRoleAgent {
    fn role(&self) -> Role {
        Role::Run
    }

    async fn take_turn(&self, history: &ConversationHistory) -> Result<String> {
        let binary = history
            .last_of(Role::Build)
            .and_then(|turn| markers::extract_field(&turn.content, markers::FIELD_BINARY))
            .filter(|path| !path.is_empty())
            .map(PathBuf::from);

        let Some(binary) = binary else {
            return Ok(
                "Nothing to run: no successful build has reported a binary path.".to_string(),
            );
        };

        match self.runner.run(&binary, None).await {
            Ok(result) if result.success => {
                let mut text = format!("{}\n", markers::RUN_SUCCEEDED);
                match result.ui_session {
                    Some(UiSession::Started) => text.push_str("ui session: started\n"),
                    Some(UiSession::Completed) => text.push_str("ui session: completed\n"),
                    None => {}
                }
                if let Some(limitation) = &result.limitation {
                    text.push_str(&format!("limitation: {limitation}\n"));
                }
                text.push_str("output:\n");
                text.push_str(&result.output_summary());
                Ok(text)
            }
            Ok(result) => {
                let reason = match result.disposition {
                    ExitDisposition::TimedOut => "the program timed out".to_string(),
                    ExitDisposition::Exited(code) => {
                        let detail = result
                            .stderr
                            .lines()
                            .find(|l| !l.trim().is_empty())
                            .unwrap_or("no error output");
                        format!("exit code {code}: {detail}")
                    }
                };
                let mut text =
                    format!("{}\n{} {}", markers::RUN_FAILED, markers::FIELD_REASON, reason);
                if let Some(limitation) = &result.limitation {
                    text.push_str(&format!("\nlimitation: {limitation}"));
                }
                Ok(text)
            }
            // The launch itself failed; the capability was still invoked.
            Err(err) => Ok(format!(
                "{}\n{} {}",
                markers::RUN_FAILED,
                markers::FIELD_REASON,
                err
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_agent_requires_a_command() {
        assert!(CommandRoleAgent::new(Role::Generate, vec![]).is_err());
        assert!(CommandRoleAgent::new(Role::Generate, vec!["cat".to_string()]).is_ok());
    }

    #[tokio::test]
    async fn test_command_agent_returns_stdout() {
        let agent =
            CommandRoleAgent::new(Role::Generate, vec!["echo".to_string(), "CODE_READY".to_string()])
                .unwrap();
        let mut history = ConversationHistory::new();
        history.append(Role::Moderator, "Specification: print hi");

        let text = agent.take_turn(&history).await.unwrap();
        assert!(text.starts_with("CODE_READY"));
    }

    #[tokio::test]
    async fn test_command_agent_failure_is_an_agent_error() {
        let agent = CommandRoleAgent::new(
            Role::Validate,
            vec!["sh".to_string(), "-c".to_string(), "exit 7; #".to_string()],
        )
        .unwrap();
        let history = ConversationHistory::new();

        let err = agent.take_turn(&history).await.unwrap_err();
        assert!(matches!(err, CrucibleError::Agent { .. }));
    }

    #[test]
    fn test_transcript_rendering() {
        let mut history = ConversationHistory::new();
        history.append(Role::Generate, "code here");
        history.append(Role::Build, "BUILD_FAILED");

        let transcript = CommandRoleAgent::transcript(&history);
        assert!(transcript.contains("=== generate\ncode here"));
        assert!(transcript.contains("=== build\nBUILD_FAILED"));
    }
}
