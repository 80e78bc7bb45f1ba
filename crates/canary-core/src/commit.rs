//! Commit controller: decides whether a task runs now, waits for an operator,
//! or is blocked.
//!
//! Every operation is a pure function of its inputs. A `CommitDecision` is
//! never edited in place; confirmation and countdown changes return a new one.

use crate::config::CommitPolicy;
use crate::error::{CanaryError, Result};
use crate::types::{CommitState, Decision, RiskAssessment, RiskTier, Task};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// CommitDecision
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitDecision {
    pub task_id: String,
    pub state: CommitState,
    pub auto_execute: bool,
    pub requires_confirmation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub countdown_seconds: Option<u64>,
    pub justification: String,
}

impl CommitDecision {
    /// The only constructor. `auto_execute` and `requires_confirmation` are
    /// derived from `state`, so a blocked or unconfirmed decision can never
    /// carry `auto_execute = true`.
    fn with_state(
        task_id: impl Into<String>,
        state: CommitState,
        countdown_seconds: Option<u64>,
        justification: String,
    ) -> Self {
        let auto_execute = state == CommitState::ActionReady;
        Self {
            task_id: task_id.into(),
            state,
            auto_execute,
            requires_confirmation: state == CommitState::NeedsConfirm,
            countdown_seconds: if auto_execute { countdown_seconds } else { None },
            justification,
        }
    }

    /// The same decision after an operator moved it to `state` outside the
    /// controller, e.g. through the queue.
    pub(crate) fn moved_to(&self, state: CommitState, countdown_seconds: Option<u64>) -> Self {
        Self::with_state(
            &self.task_id,
            state,
            countdown_seconds,
            format!("{}; moved to {state} by operator", self.justification),
        )
    }

    /// True when the derived flags agree with `state`.
    pub fn is_consistent(&self) -> bool {
        self.auto_execute == (self.state == CommitState::ActionReady)
            && self.requires_confirmation == (self.state == CommitState::NeedsConfirm)
            && (self.auto_execute || self.countdown_seconds.is_none())
    }
}

// ---------------------------------------------------------------------------
// CommitController
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct CommitController {
    policy: CommitPolicy,
}

impl CommitController {
    pub fn new(policy: CommitPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &CommitPolicy {
        &self.policy
    }

    pub fn determine_commit(
        &self,
        task: &Task,
        risk: &RiskAssessment,
        decision: &Decision,
    ) -> CommitDecision {
        let tier = task.risk_tier.max(risk.tier);
        let policy = &self.policy;
        let risk_note = risk_summary(tier, risk);

        if tier > policy.block_above {
            return CommitDecision::with_state(
                &task.id,
                CommitState::Blocked,
                None,
                format!(
                    "blocked: {risk_note} exceeds the {} ceiling regardless of confidence {:.2}",
                    policy.block_above, decision.confidence
                ),
            );
        }

        if decision.needs_clarification {
            return CommitDecision::with_state(
                &task.id,
                CommitState::NeedsConfirm,
                None,
                format!("needs confirmation: intent is ambiguous ({risk_note})"),
            );
        }

        if decision.confidence < policy.auto_execute_confidence {
            return CommitDecision::with_state(
                &task.id,
                CommitState::NeedsConfirm,
                None,
                format!(
                    "needs confirmation: confidence {:.2} is below {:.2} ({risk_note})",
                    decision.confidence, policy.auto_execute_confidence
                ),
            );
        }

        if tier > policy.auto_execute_max_tier {
            return CommitDecision::with_state(
                &task.id,
                CommitState::NeedsConfirm,
                None,
                format!(
                    "needs confirmation: {risk_note} is above the auto-execute limit {} \
                     despite confidence {:.2}",
                    policy.auto_execute_max_tier, decision.confidence
                ),
            );
        }

        CommitDecision::with_state(
            &task.id,
            CommitState::ActionReady,
            Some(policy.default_countdown_secs),
            format!(
                "auto-execute in {}s: confidence {:.2} with {risk_note}",
                policy.default_countdown_secs, decision.confidence
            ),
        )
    }

    /// Operator answer to a `NeedsConfirm` decision. The countdown restarts
    /// from the policy default.
    pub fn process_confirmation(
        &self,
        commit: &CommitDecision,
        confirmed: bool,
    ) -> Result<CommitDecision> {
        let target = if confirmed {
            CommitState::ActionReady
        } else {
            CommitState::Cancelled
        };
        if commit.state != CommitState::NeedsConfirm {
            return Err(invalid_transition(
                commit.state,
                target,
                "only decisions awaiting confirmation can be confirmed or rejected",
            ));
        }

        let decision = if confirmed {
            CommitDecision::with_state(
                &commit.task_id,
                CommitState::ActionReady,
                Some(self.policy.default_countdown_secs),
                format!(
                    "confirmed by operator; executing in {}s",
                    self.policy.default_countdown_secs
                ),
            )
        } else {
            CommitDecision::with_state(
                &commit.task_id,
                CommitState::Cancelled,
                None,
                "rejected by operator".to_string(),
            )
        };
        Ok(decision)
    }

    /// Change the grace period of an `ActionReady` decision. Zero means
    /// "run as soon as possible".
    pub fn update_countdown(&self, commit: &CommitDecision, seconds: u64) -> Result<CommitDecision> {
        if commit.state != CommitState::ActionReady {
            return Err(invalid_transition(
                commit.state,
                CommitState::ActionReady,
                "countdown can only be changed on a ready action",
            ));
        }
        Ok(CommitDecision::with_state(
            &commit.task_id,
            CommitState::ActionReady,
            Some(seconds),
            format!("{}; countdown set to {seconds}s", commit.justification),
        ))
    }
}

fn risk_summary(tier: RiskTier, risk: &RiskAssessment) -> String {
    let mut out = format!("risk tier {tier}");
    if let Some(score) = risk.score {
        out.push_str(&format!(" (score {score:.2})"));
    }
    if !risk.reasons.is_empty() {
        out.push_str(&format!(": {}", risk.reasons.join(", ")));
    }
    out
}

fn invalid_transition(from: CommitState, to: CommitState, reason: &str) -> CanaryError {
    CanaryError::InvalidTransition {
        from: from.to_string(),
        to: to.to_string(),
        reason: reason.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
