//! The pipeline driver: round-robin role scheduling over a shared
//! conversation, with the workflow manager steering via directives and
//! termination decisions.

use crucible_core::agent::RoleAgent;
use crucible_core::audit::{AuditCounters, AuditSnapshot};
use crucible_core::config::WorkflowConfig;
use crucible_core::conversation::{ConversationHistory, DeltaTracker, Role};
use crucible_core::workflow::{WorkflowDecision, WorkflowManager, WorkflowOutcome};
use crucible_core::{CrucibleError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Outcome of a single pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    pub run_id: Uuid,
    pub outcome: WorkflowOutcome,
    /// Full rotations through the four worker roles.
    pub cycles: u32,
    /// Worker and moderator turns appended after the initial specification.
    pub turns: usize,
    /// Final audit-counter readings for the run.
    pub audit: AuditSnapshot,
    pub history: ConversationHistory,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == WorkflowOutcome::Success
    }
}

/// Drives one specification through the role rotation until the workflow
/// manager terminates the run.
pub struct Pipeline {
    run_id: Uuid,
    agents: HashMap<Role, Arc<dyn RoleAgent>>,
    workflow: WorkflowManager,
    audit: Arc<AuditCounters>,
    delta: DeltaTracker,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("run_id", &self.run_id)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Builds a pipeline from one agent per worker role.
    ///
    /// Fails if any rotation slot is missing, or if an agent reports a role
    /// other than the one it is registered under.
    pub fn new(
        config: WorkflowConfig,
        audit: Arc<AuditCounters>,
        agents: Vec<Arc<dyn RoleAgent>>,
    ) -> Result<Self> {
        let mut map: HashMap<Role, Arc<dyn RoleAgent>> = HashMap::new();
        for agent in agents {
            let role = agent.role();
            if map.insert(role, agent).is_some() {
                return Err(CrucibleError::config(format!(
                    "two agents registered for the {role} role"
                )));
            }
        }
        for role in Role::ROTATION {
            if !map.contains_key(&role) {
                return Err(CrucibleError::config(format!(
                    "no agent registered for the {role} role"
                )));
            }
        }

        let workflow = WorkflowManager::new(config, Arc::clone(&audit));
        Ok(Self {
            run_id: Uuid::new_v4(),
            agents: map,
            workflow,
            audit,
            delta: DeltaTracker::new(),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Runs the rotation over `spec_text` to completion.
    ///
    /// The specification enters the history as an initial moderator turn so
    /// every role sees it. Agent errors abort the run; marker-level failures
    /// are conversation content and stay inside it.
    pub async fn run(mut self, spec_text: &str) -> Result<PipelineReport> {
        let mut history = ConversationHistory::new();
        history.append(Role::Moderator, format!("Specification:\n{spec_text}"));
        tracing::info!(run_id = %self.run_id, "pipeline run started");

        let mut role = Role::Generate;
        let outcome = loop {
            let agent = self
                .agents
                .get(&role)
                .ok_or_else(|| CrucibleError::internal(format!("missing agent for {role}")))?
                .clone();

            let before = self.workflow.sample();
            let text = agent.take_turn(&history).await?;

            let novel = self.delta.novel_suffix(role, &text);
            if !novel.trim().is_empty() {
                tracing::info!(run_id = %self.run_id, %role, "{}", novel.trim_end());
            }

            let turn = history.append(role, text).clone();
            match self.workflow.observe_turn(&turn, before) {
                WorkflowDecision::Continue => {}
                WorkflowDecision::Directive { target, text } => {
                    tracing::info!(run_id = %self.run_id, %target, directive = %text, "directive injected");
                    history.append(Role::Moderator, format!("[directive to {target}] {text}"));
                }
                WorkflowDecision::Terminate(outcome) => break outcome,
            }
            role = role.next();
        };

        tracing::info!(
            run_id = %self.run_id,
            ?outcome,
            cycles = self.workflow.completed_cycles(),
            "pipeline run finished"
        );

        Ok(PipelineReport {
            run_id: self.run_id,
            outcome,
            cycles: self.workflow.completed_cycles(),
            turns: history.len().saturating_sub(1),
            audit: self.audit.snapshot(),
            history,
        })
    }
}
