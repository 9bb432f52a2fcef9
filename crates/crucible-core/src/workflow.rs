//! Turn-based workflow management.
//!
//! The manager inspects each completed turn together with audit-counter
//! samples taken around it, and decides whether the conversation continues,
//! receives an out-of-band directive, or terminates.

use crate::audit::{AuditCounters, AuditSnapshot};
use crate::config::WorkflowConfig;
use crate::conversation::{ConversationTurn, Role};
use crate::markers;
use crate::repair::{FailureCategory, RepairSynthesizer};
use std::sync::Arc;

/// Decision produced after observing a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowDecision {
    /// Advance to the next role.
    Continue,
    /// Inject a synthetic moderator turn addressed to `target`, then
    /// advance. Does not consume a role slot.
    Directive { target: Role, text: String },
    /// Stop the conversation.
    Terminate(WorkflowOutcome),
}

/// Terminal outcome of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// The validator accepted the result and the audit confirms both
    /// capabilities really ran.
    Success,
    /// The hard iteration ceiling was reached. A safety-net exit, never
    /// reported as success.
    MaxCyclesReached,
}

/// Decides termination and directive injection for a pipeline run.
///
/// Owns the repair synthesizer and the audit baseline; shares the counters
/// with the tool-backed components through `Arc` (no hidden globals, so
/// concurrent runs in one process stay isolated).
pub struct WorkflowManager {
    config: WorkflowConfig,
    audit: Arc<AuditCounters>,
    baseline: AuditSnapshot,
    repair: RepairSynthesizer,
    completed_cycles: u32,
}

impl WorkflowManager {
    pub fn new(config: WorkflowConfig, audit: Arc<AuditCounters>) -> Self {
        let baseline = audit.snapshot();
        let repair = RepairSynthesizer::new(config.directive_max_len);
        Self {
            config,
            audit,
            baseline,
            repair,
            completed_cycles: 0,
        }
    }

    /// Samples the audit counters. The driver takes this before a turn and
    /// hands it back to [`observe_turn`](Self::observe_turn).
    pub fn sample(&self) -> AuditSnapshot {
        self.audit.snapshot()
    }

    /// Number of full role cycles observed so far.
    pub fn completed_cycles(&self) -> u32 {
        self.completed_cycles
    }

    /// Evaluates a freshly appended turn.
    ///
    /// `before` is the audit sample taken just before the turn's role ran;
    /// the manager samples again itself to detect counter movement during
    /// the turn.
    pub fn observe_turn(
        &mut self,
        turn: &ConversationTurn,
        before: AuditSnapshot,
    ) -> WorkflowDecision {
        let after = self.audit.snapshot();
        let decision = self.evaluate(turn, before, after);

        // A validator turn closes one full rotation.
        if turn.role == Role::Validate {
            self.completed_cycles += 1;
        }

        if !matches!(decision, WorkflowDecision::Terminate(_))
            && self.completed_cycles >= self.config.max_cycles
        {
            tracing::warn!(
                cycles = self.completed_cycles,
                "iteration ceiling reached, forcing safety-net termination"
            );
            return WorkflowDecision::Terminate(WorkflowOutcome::MaxCyclesReached);
        }

        decision
    }

    fn evaluate(
        &mut self,
        turn: &ConversationTurn,
        before: AuditSnapshot,
        after: AuditSnapshot,
    ) -> WorkflowDecision {
        match turn.role {
            Role::Moderator | Role::Generate => WorkflowDecision::Continue,
            Role::Build => {
                if markers::claims_outcome(Role::Build, &turn.content)
                    && !before.compile_advanced(&after)
                {
                    return self.demand_capability(Role::Build, "compile");
                }
                self.route_failure(turn)
            }
            Role::Run => {
                if markers::claims_outcome(Role::Run, &turn.content)
                    && !before.execute_advanced(&after)
                {
                    return self.demand_capability(Role::Run, "run");
                }
                self.route_failure(turn)
            }
            Role::Validate => {
                if markers::claims_success(Role::Validate, &turn.content) {
                    return self.check_termination(after);
                }
                self.route_failure(turn)
            }
        }
    }

    /// Validator claimed success; terminate only if the audit confirms both
    /// capabilities actually ran during this conversation.
    fn check_termination(&self, now: AuditSnapshot) -> WorkflowDecision {
        let compiled = self.baseline.compile_advanced(&now);
        let executed = self.baseline.execute_advanced(&now);

        if compiled && executed {
            tracing::info!("validator accepted result, audit confirms both capabilities ran");
            return WorkflowDecision::Terminate(WorkflowOutcome::Success);
        }

        let missing = if !compiled { "compile" } else { "run" };
        tracing::warn!(missing, "validation success claimed without capability invocation");
        let target = if !compiled { Role::Build } else { Role::Run };
        WorkflowDecision::Directive {
            target,
            text: format!(
                "Validation success cannot be accepted: the {missing} capability was never \
                 invoked in this conversation. The {target} role must actually invoke its \
                 {missing} tool and report the real result."
            ),
        }
    }

    fn demand_capability(&self, target: Role, capability: &str) -> WorkflowDecision {
        tracing::warn!(role = %target, capability, "outcome claimed without tool invocation");
        WorkflowDecision::Directive {
            target,
            text: format!(
                "The {target} role reported a {capability} outcome but the {capability} \
                 capability was not invoked. Do not fabricate results: invoke the \
                 {capability} tool and report what it actually returned."
            ),
        }
    }

    /// Routes a failure marker through the repair synthesizer. Duplicate
    /// failures produce no directive.
    fn route_failure(&mut self, turn: &ConversationTurn) -> WorkflowDecision {
        if !markers::claims_failure(turn.role, &turn.content) {
            return WorkflowDecision::Continue;
        }
        let Some(category) = FailureCategory::for_role(turn.role) else {
            return WorkflowDecision::Continue;
        };
        match self.repair.synthesize(category, &turn.content) {
            Some(text) => WorkflowDecision::Directive {
                target: Role::Generate,
                text,
            },
            None => WorkflowDecision::Continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ConversationHistory;

    fn manager_with(max_cycles: u32) -> (WorkflowManager, Arc<AuditCounters>) {
        let audit = Arc::new(AuditCounters::new());
        let config = WorkflowConfig {
            max_cycles,
            ..WorkflowConfig::default()
        };
        (WorkflowManager::new(config, audit.clone()), audit)
    }

    fn turn(history: &mut ConversationHistory, role: Role, text: &str) -> ConversationTurn {
        history.append(role, text).clone()
    }

    #[test]
    fn test_success_termination_requires_both_counters() {
        let (mut manager, audit) = manager_with(15);
        let mut history = ConversationHistory::new();

        audit.record_compile();
        audit.record_execute();
        let before = manager.sample();
        let validate = turn(&mut history, Role::Validate, "VALIDATION_PASSED\nreason: ok");

        assert_eq!(
            manager.observe_turn(&validate, before),
            WorkflowDecision::Terminate(WorkflowOutcome::Success)
        );
    }

    #[test]
    fn test_success_refused_when_compile_never_ran() {
        let (mut manager, audit) = manager_with(15);
        let mut history = ConversationHistory::new();

        audit.record_execute();
        let before = manager.sample();
        let validate = turn(&mut history, Role::Validate, "VALIDATION_PASSED");

        match manager.observe_turn(&validate, before) {
            WorkflowDecision::Directive { target, text } => {
                assert_eq!(target, Role::Build);
                assert!(text.contains("compile"));
            }
            other => panic!("expected directive, got {:?}", other),
        }
    }

    #[test]
    fn test_build_claim_without_invocation_is_flagged() {
        let (mut manager, _audit) = manager_with(15);
        let mut history = ConversationHistory::new();

        let before = manager.sample();
        let build = turn(&mut history, Role::Build, "BUILD_SUCCEEDED\nbinary: /fake");

        match manager.observe_turn(&build, before) {
            WorkflowDecision::Directive { target, text } => {
                assert_eq!(target, Role::Build);
                assert!(text.contains("not invoked"));
            }
            other => panic!("expected directive, got {:?}", other),
        }
    }

    #[test]
    fn test_real_build_claim_passes_audit() {
        let (mut manager, audit) = manager_with(15);
        let mut history = ConversationHistory::new();

        let before = manager.sample();
        audit.record_compile();
        let build = turn(&mut history, Role::Build, "BUILD_SUCCEEDED\nbinary: /out/app");

        assert_eq!(manager.observe_turn(&build, before), WorkflowDecision::Continue);
    }

    #[test]
    fn test_build_failure_produces_repair_directive_once() {
        let (mut manager, audit) = manager_with(15);
        let mut history = ConversationHistory::new();
        let text = "BUILD_FAILED\nProgram.cs(3,14): error CS1002: ; expected";

        let before = manager.sample();
        audit.record_compile();
        let first = turn(&mut history, Role::Build, text);
        match manager.observe_turn(&first, before) {
            WorkflowDecision::Directive { target, text } => {
                assert_eq!(target, Role::Generate);
                assert!(text.contains("CS1002"));
            }
            other => panic!("expected directive, got {:?}", other),
        }

        // Identical failure again: suppressed
        let before = manager.sample();
        audit.record_compile();
        let second = turn(&mut history, Role::Build, text);
        assert_eq!(manager.observe_turn(&second, before), WorkflowDecision::Continue);
    }

    #[test]
    fn test_ceiling_forces_non_success_termination() {
        let (mut manager, audit) = manager_with(2);
        let mut history = ConversationHistory::new();

        for _ in 0..2 {
            for role in Role::ROTATION {
                let before = manager.sample();
                match role {
                    Role::Build => audit.record_compile(),
                    Role::Run => audit.record_execute(),
                    _ => {}
                }
                let text = match role {
                    Role::Validate => "VALIDATION_FAILED\nreason: not yet".to_string(),
                    _ => "working".to_string(),
                };
                let t = turn(&mut history, role, &text);
                let decision = manager.observe_turn(&t, before);
                if manager.completed_cycles() >= 2 {
                    assert_eq!(
                        decision,
                        WorkflowDecision::Terminate(WorkflowOutcome::MaxCyclesReached)
                    );
                    return;
                }
            }
        }
        panic!("ceiling never fired");
    }

    #[test]
    fn test_generate_turn_is_not_audited() {
        let (mut manager, _audit) = manager_with(15);
        let mut history = ConversationHistory::new();

        let before = manager.sample();
        let generate = turn(&mut history, Role::Generate, "CODE_READY\n```csharp\n...\n```");
        assert_eq!(manager.observe_turn(&generate, before), WorkflowDecision::Continue);
    }
}
