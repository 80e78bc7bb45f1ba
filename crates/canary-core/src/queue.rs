//! Pending action queue.
//!
//! Holds commit decisions until an operator confirms them or their countdown
//! elapses. Records live in an insertion-ordered arena (`BTreeMap` keyed by a
//! monotonic sequence) with a UUID index, so every listing is stable for a
//! fixed clock and insertion order.
//!
//! The queue has a single writer. Hosts share it behind one mutex; under that
//! mutex [`PendingActionQueue::take_ready`] is the atomic ready-scan plus
//! dequeue that keeps an action from being handed to two executors.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::commit::{CommitController, CommitDecision};
use crate::error::{CanaryError, Result};
use crate::types::CommitState;

// ---------------------------------------------------------------------------
// QueuedAction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    pub id: Uuid,
    pub decision: CommitDecision,
    /// Always equal to `decision.state`; state changes replace the decision.
    pub state: CommitState,
    pub queued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execute_at: Option<DateTime<Utc>>,
}

impl QueuedAction {
    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.state == CommitState::ActionReady && self.execute_at.is_some_and(|at| now >= at)
    }
}

// ---------------------------------------------------------------------------
// PendingActionQueue
// ---------------------------------------------------------------------------

pub struct PendingActionQueue {
    clock: Arc<dyn Clock>,
    entries: BTreeMap<u64, QueuedAction>,
    index: HashMap<Uuid, u64>,
    next_seq: u64,
}

impl PendingActionQueue {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            entries: BTreeMap::new(),
            index: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn enqueue(&mut self, decision: CommitDecision) -> QueuedAction {
        let now = self.clock.now();
        let execute_at = if decision.auto_execute {
            Some(now + countdown(decision.countdown_seconds.unwrap_or(0)))
        } else {
            None
        };
        let action = QueuedAction {
            id: Uuid::new_v4(),
            state: decision.state,
            decision,
            queued_at: now,
            execute_at,
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        self.index.insert(action.id, seq);
        self.entries.insert(seq, action.clone());

        tracing::debug!(
            action_id = %action.id,
            task_id = %action.decision.task_id,
            state = %action.state,
            "queued action"
        );
        action
    }

    pub fn get(&self, id: Uuid) -> Option<&QueuedAction> {
        self.index.get(&id).and_then(|seq| self.entries.get(seq))
    }

    /// Every queued action in insertion order.
    pub fn list(&self) -> Vec<QueuedAction> {
        self.entries.values().cloned().collect()
    }

    /// Actions whose countdown has elapsed, in insertion order.
    pub fn ready_actions(&self) -> Vec<QueuedAction> {
        let now = self.clock.now();
        self.entries
            .values()
            .filter(|a| a.is_ready(now))
            .cloned()
            .collect()
    }

    pub fn waiting_actions(&self) -> Vec<QueuedAction> {
        self.with_state(CommitState::NeedsConfirm)
    }

    pub fn blocked_actions(&self) -> Vec<QueuedAction> {
        self.with_state(CommitState::Blocked)
    }

    fn with_state(&self, state: CommitState) -> Vec<QueuedAction> {
        self.entries
            .values()
            .filter(|a| a.state == state)
            .cloned()
            .collect()
    }

    /// Move a queued action to `new_state`.
    ///
    /// Returns `Ok(false)` when the id is unknown; a caller racing with a
    /// dequeue sees absence, not an error. Entering `ActionReady` without an
    /// `execute_at` makes the action ready immediately.
    pub fn update_state(&mut self, id: Uuid, new_state: CommitState) -> Result<bool> {
        let now = self.clock.now();
        let Some(action) = self.entry_mut(id) else {
            return Ok(false);
        };
        if !action.state.can_transition_to(new_state) {
            return Err(CanaryError::InvalidTransition {
                from: action.state.to_string(),
                to: new_state.to_string(),
                reason: format!("queued action {id} cannot move backwards or leave a terminal state"),
            });
        }
        let from = action.state;
        if from == new_state {
            return Ok(true);
        }
        let mut countdown_seconds = None;
        if new_state == CommitState::ActionReady {
            let execute_at = *action.execute_at.get_or_insert(now);
            countdown_seconds = Some(u64::try_from((execute_at - now).num_seconds()).unwrap_or(0));
        }
        action.decision = action.decision.moved_to(new_state, countdown_seconds);
        action.state = new_state;
        tracing::debug!(action_id = %id, %from, to = %new_state, "queued action state changed");
        Ok(true)
    }

    /// Apply an operator's confirmation to a queued `NeedsConfirm` action.
    /// The countdown starts now. Returns `Ok(None)` when the id is unknown.
    pub fn confirm(
        &mut self,
        id: Uuid,
        confirmed: bool,
        controller: &CommitController,
    ) -> Result<Option<QueuedAction>> {
        let now = self.clock.now();
        let Some(action) = self.entry_mut(id) else {
            return Ok(None);
        };
        let decision = controller.process_confirmation(&action.decision, confirmed)?;
        action.execute_at = if decision.auto_execute {
            Some(now + countdown(decision.countdown_seconds.unwrap_or(0)))
        } else {
            None
        };
        action.state = decision.state;
        action.decision = decision;
        tracing::info!(action_id = %id, confirmed, state = %action.state, "operator answered queued action");
        Ok(Some(action.clone()))
    }

    /// Shorten or extend the countdown of a ready action. `execute_at` is
    /// recomputed from now. Returns `Ok(false)` when the id is unknown.
    pub fn reschedule(
        &mut self,
        id: Uuid,
        seconds: u64,
        controller: &CommitController,
    ) -> Result<bool> {
        let now = self.clock.now();
        let Some(action) = self.entry_mut(id) else {
            return Ok(false);
        };
        if action.state != CommitState::ActionReady {
            return Err(CanaryError::InvalidTransition {
                from: action.state.to_string(),
                to: CommitState::ActionReady.to_string(),
                reason: "countdown can only be changed on a ready action".to_string(),
            });
        }
        let decision = controller.update_countdown(&action.decision, seconds)?;
        action.decision = decision;
        action.execute_at = Some(now + countdown(seconds));
        Ok(true)
    }

    /// Remove and return an action, typically once an executor has taken it.
    pub fn dequeue(&mut self, id: Uuid) -> Option<QueuedAction> {
        let seq = self.index.remove(&id)?;
        let action = self.entries.remove(&seq);
        if action.is_some() {
            tracing::debug!(action_id = %id, "dequeued action");
        }
        action
    }

    /// Remove and return every ready action in one step.
    pub fn take_ready(&mut self) -> Vec<QueuedAction> {
        let now = self.clock.now();
        let ready: Vec<u64> = self
            .entries
            .iter()
            .filter(|(_, a)| a.is_ready(now))
            .map(|(seq, _)| *seq)
            .collect();

        let mut taken = Vec::with_capacity(ready.len());
        for seq in ready {
            if let Some(action) = self.entries.remove(&seq) {
                self.index.remove(&action.id);
                taken.push(action);
            }
        }
        if !taken.is_empty() {
            tracing::info!(count = taken.len(), "handed ready actions to executor");
        }
        taken
    }

    fn entry_mut(&mut self, id: Uuid) -> Option<&mut QueuedAction> {
        let seq = *self.index.get(&id)?;
        self.entries.get_mut(&seq)
    }
}

/// Countdowns are clamped to `u32::MAX` seconds so the addition to a
/// timestamp cannot overflow.
fn countdown(seconds: u64) -> Duration {
    Duration::seconds(i64::from(u32::try_from(seconds).unwrap_or(u32::MAX)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
