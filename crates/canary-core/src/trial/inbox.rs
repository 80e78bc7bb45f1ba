use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::Trial;
use crate::error::CanaryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InboxTab {
    #[default]
    Pending,
    NeedsReview,
    Completed,
}

impl InboxTab {
    pub fn all() -> &'static [InboxTab] {
        &[InboxTab::Pending, InboxTab::NeedsReview, InboxTab::Completed]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InboxTab::Pending => "pending",
            InboxTab::NeedsReview => "needs_review",
            InboxTab::Completed => "completed",
        }
    }

    /// Which tab a trial belongs in right now.
    pub fn of(trial: &Trial) -> InboxTab {
        match trial.survived {
            None => InboxTab::Pending,
            Some(true) => InboxTab::Completed,
            Some(false) if trial.reverted || trial.noted_after_verdict => InboxTab::Completed,
            Some(false) => InboxTab::NeedsReview,
        }
    }
}

impl fmt::Display for InboxTab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InboxTab {
    type Err = CanaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "pending" => Ok(InboxTab::Pending),
            "needs_review" | "review" => Ok(InboxTab::NeedsReview),
            "completed" | "done" => Ok(InboxTab::Completed),
            other => Err(CanaryError::validation(format!(
                "unknown inbox tab '{other}' (expected pending, needs_review or completed)"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxItem {
    #[serde(flatten)]
    pub trial: Trial,
    /// Past its check time but not yet resolved.
    pub due: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboxCounts {
    pub pending: usize,
    pub needs_review: usize,
    pub completed: usize,
    /// Pending trials already past `check_at`.
    pub due: usize,
    /// Pending trials whose metric lookups keep failing.
    pub stalled: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inbox {
    pub tab: InboxTab,
    pub items: Vec<InboxItem>,
    pub counts: InboxCounts,
}

/// Partition `trials` and return the requested tab, truncated to `limit`.
/// Counts always cover every trial.
pub(crate) fn build(
    trials: Vec<Trial>,
    tab: InboxTab,
    limit: usize,
    now: DateTime<Utc>,
    stall_threshold: u32,
) -> Inbox {
    let mut counts = InboxCounts::default();
    let mut items = Vec::new();

    for trial in trials {
        let trial_tab = InboxTab::of(&trial);
        match trial_tab {
            InboxTab::Pending => {
                counts.pending += 1;
                if trial.is_due(now) {
                    counts.due += 1;
                }
                if stall_threshold > 0 && trial.resolve_failures >= stall_threshold {
                    counts.stalled += 1;
                }
            }
            InboxTab::NeedsReview => counts.needs_review += 1,
            InboxTab::Completed => counts.completed += 1,
        }
        if trial_tab == tab {
            let due = trial.is_due(now);
            items.push(InboxItem { trial, due });
        }
    }

    match tab {
        InboxTab::Pending => items.sort_by(|a, b| {
            a.trial
                .check_at
                .cmp(&b.trial.check_at)
                .then_with(|| a.trial.created_at.cmp(&b.trial.created_at))
        }),
        InboxTab::NeedsReview | InboxTab::Completed => items.sort_by(|a, b| {
            b.trial
                .checked_at
                .cmp(&a.trial.checked_at)
                .then_with(|| b.trial.created_at.cmp(&a.trial.created_at))
        }),
    }
    items.truncate(limit);

    Inbox { tab, items, counts }
}
