use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::audit::{AuditEntry, AuditEvent};
use super::db::TrialDb;
use super::inbox::{self, Inbox, InboxTab};
use super::model::{validate_check_after, NewTrial, Trial};
use super::store::{MemoryTrialStore, TrialStore};
use super::verdict;
use crate::clock::Clock;
use crate::config::{Config, TrialPolicy};
use crate::error::{CanaryError, Result};
use crate::metric::{self, MetricResolver};
use crate::paths;

/// Upper bound chrono accepts for `Duration::seconds`.
const MAX_BACKOFF_SECS: u64 = (i64::MAX / 1000) as u64;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupFailure {
    pub trial_id: Uuid,
    pub metric: String,
    pub error: String,
    pub failures: u32,
    pub retry_at: DateTime<Utc>,
}

/// Outcome of one `check_due` pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    pub resolved: Vec<Trial>,
    pub failed: Vec<LookupFailure>,
}

impl CheckReport {
    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialDetail {
    pub trial: Trial,
    /// Ascending by `seq`.
    pub audit: Vec<AuditEntry>,
}

// ---------------------------------------------------------------------------
// Book: in-memory arena guarded by the state lock
// ---------------------------------------------------------------------------

struct Book {
    store: Box<dyn TrialStore>,
    /// Creation order.
    trials: Vec<Trial>,
    index: HashMap<Uuid, usize>,
    audit: HashMap<Uuid, Vec<AuditEntry>>,
    next_seq: u64,
}

/// An audit entry before its `seq` is assigned.
struct Draft {
    trial_id: Uuid,
    event: AuditEvent,
    at: DateTime<Utc>,
    detail: Option<String>,
}

impl Draft {
    fn new(trial_id: Uuid, event: AuditEvent, at: DateTime<Utc>, detail: impl Into<String>) -> Self {
        Self {
            trial_id,
            event,
            at,
            detail: Some(detail.into()),
        }
    }
}

impl Book {
    fn load(store: Box<dyn TrialStore>) -> Result<Self> {
        let stored = store.load()?;

        let next_seq = stored.audit.last().map_or(0, |e| e.seq + 1);
        let mut created_seq: HashMap<Uuid, u64> = HashMap::new();
        let mut audit: HashMap<Uuid, Vec<AuditEntry>> = HashMap::new();
        for entry in stored.audit {
            if entry.event == AuditEvent::Created {
                created_seq.entry(entry.trial_id).or_insert(entry.seq);
            }
            audit.entry(entry.trial_id).or_default().push(entry);
        }

        let mut trials = stored.trials;
        trials.sort_by(|a, b| {
            let sa = created_seq.get(&a.id).copied().unwrap_or(u64::MAX);
            let sb = created_seq.get(&b.id).copied().unwrap_or(u64::MAX);
            sa.cmp(&sb).then_with(|| a.created_at.cmp(&b.created_at))
        });
        let index = trials.iter().enumerate().map(|(i, t)| (t.id, i)).collect();

        Ok(Self {
            store,
            trials,
            index,
            audit,
            next_seq,
        })
    }

    fn get(&self, id: Uuid) -> Result<&Trial> {
        self.index
            .get(&id)
            .map(|&i| &self.trials[i])
            .ok_or_else(|| CanaryError::TrialNotFound(id.to_string()))
    }

    /// Persist `trials` and `drafts` in one store write, then apply them to
    /// memory. On error nothing in memory changes.
    fn commit(&mut self, trials: Vec<Trial>, drafts: Vec<Draft>) -> Result<Vec<AuditEntry>> {
        let entries: Vec<AuditEntry> = drafts
            .into_iter()
            .enumerate()
            .map(|(i, d)| AuditEntry {
                seq: self.next_seq + i as u64,
                trial_id: d.trial_id,
                event: d.event,
                at: d.at,
                detail: d.detail,
            })
            .collect();

        self.store.record(&trials, &entries)?;

        self.next_seq += entries.len() as u64;
        for trial in trials {
            match self.index.get(&trial.id) {
                Some(&i) => self.trials[i] = trial,
                None => {
                    self.index.insert(trial.id, self.trials.len());
                    self.trials.push(trial);
                }
            }
        }
        for entry in &entries {
            self.audit.entry(entry.trial_id).or_default().push(entry.clone());
        }
        Ok(entries)
    }
}

// ---------------------------------------------------------------------------
// TrialEngine
// ---------------------------------------------------------------------------

pub struct TrialEngine {
    book: Mutex<Book>,
    /// Held for the whole of `check_due` so scans never overlap.
    scan: Mutex<()>,
    metrics: Arc<dyn MetricResolver>,
    clock: Arc<dyn Clock>,
    policy: TrialPolicy,
}

impl TrialEngine {
    /// Rebuild the engine from whatever `store` already holds.
    pub fn open(
        store: Box<dyn TrialStore>,
        metrics: Arc<dyn MetricResolver>,
        clock: Arc<dyn Clock>,
        policy: TrialPolicy,
    ) -> Result<Self> {
        let book = Book::load(store)?;
        debug!(trials = book.trials.len(), "trial engine opened");
        Ok(Self {
            book: Mutex::new(book),
            scan: Mutex::new(()),
            metrics,
            clock,
            policy,
        })
    }

    /// Engine backed by a fresh `MemoryTrialStore`.
    pub fn in_memory(
        metrics: Arc<dyn MetricResolver>,
        clock: Arc<dyn Clock>,
        policy: TrialPolicy,
    ) -> Self {
        Self {
            book: Mutex::new(Book {
                store: Box::new(MemoryTrialStore::new()),
                trials: Vec::new(),
                index: HashMap::new(),
                audit: HashMap::new(),
                next_seq: 0,
            }),
            scan: Mutex::new(()),
            metrics,
            clock,
            policy,
        }
    }

    /// Engine for a project root: `.canary/canary.db` plus the metric source
    /// named in `config`.
    pub fn open_project(root: &Path, config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = TrialDb::open(&paths::db_path(root))?;
        let metrics = metric::from_config(root, &config.metrics)?;
        Self::open(Box::new(store), metrics, clock, config.trial.clone())
    }

    pub fn policy(&self) -> &TrialPolicy {
        &self.policy
    }

    fn book(&self) -> MutexGuard<'_, Book> {
        self.book.lock().unwrap_or_else(|e| e.into_inner())
    }

    // -- Commands ----------------------------------------------------------

    pub fn create(&self, input: NewTrial) -> Result<Trial> {
        input.validate()?;
        let before = self.metrics.resolve(input.metric_name.trim())?;
        let now = self.clock.now();
        let trial = input.into_trial(before, now);

        let detail = format!(
            "{} = {} before '{}', check in {}s",
            trial.metric_name, before, trial.action, trial.check_after_sec
        );
        self.book().commit(
            vec![trial.clone()],
            vec![Draft::new(trial.id, AuditEvent::Created, now, detail)],
        )?;
        info!(id = %trial.id, metric = %trial.metric_name, check_at = %trial.check_at, "trial created");
        Ok(trial)
    }

    /// Resolve every due trial. Safe to call repeatedly; a trial is only
    /// ever resolved once.
    pub fn check_due(&self) -> Result<CheckReport> {
        let _scan = self.scan.lock().unwrap_or_else(|e| e.into_inner());
        let now = self.clock.now();

        let due: Vec<(Uuid, String)> = self
            .book()
            .trials
            .iter()
            .filter(|t| t.is_eligible(now))
            .map(|t| (t.id, t.metric_name.clone()))
            .collect();

        let mut report = CheckReport::default();
        for (id, metric_name) in due {
            let lookup = self.metrics.resolve(&metric_name);
            let at = self.clock.now();

            let mut book = self.book();
            let current = book.get(id)?.clone();
            if current.is_resolved() {
                continue;
            }

            match lookup {
                Ok(after) => {
                    let survived = verdict::survived(
                        current.direction,
                        current.metric_before,
                        after,
                        current.expected_delta,
                        self.policy.regress_tolerance,
                    );
                    let resolved = current.resolved(after, survived, at);
                    let outcome = if survived { "survived" } else { "failed" };
                    let detail = format!(
                        "{outcome}: {} {} -> {}",
                        current.metric_name, current.metric_before, after
                    );
                    book.commit(
                        vec![resolved.clone()],
                        vec![Draft::new(id, AuditEvent::Resolved, at, detail)],
                    )?;
                    info!(id = %id, survived, before = current.metric_before, after, "trial resolved");
                    report.resolved.push(resolved);
                }
                Err(e) => {
                    let failures = current.resolve_failures.saturating_add(1);
                    let retry_at = at
                        .checked_add_signed(self.backoff(failures))
                        .unwrap_or(DateTime::<Utc>::MAX_UTC);
                    let message = e.to_string();
                    book.commit(vec![current.lookup_failed(message.clone(), retry_at)], vec![])?;
                    if self.policy.alert_after_failures > 0
                        && failures >= self.policy.alert_after_failures
                    {
                        error!(id = %id, metric = %metric_name, failures, error = %message, "trial metric keeps failing");
                    } else {
                        warn!(id = %id, metric = %metric_name, failures, error = %message, "trial metric lookup failed");
                    }
                    report.failed.push(LookupFailure {
                        trial_id: id,
                        metric: metric_name,
                        error: message,
                        failures,
                        retry_at,
                    });
                }
            }
        }
        Ok(report)
    }

    /// `min(base * 2^(failures - 1), max)`.
    fn backoff(&self, failures: u32) -> Duration {
        let factor = 1u64
            .checked_shl(failures.saturating_sub(1))
            .unwrap_or(u64::MAX);
        let secs = self
            .policy
            .retry_base_secs
            .saturating_mul(factor)
            .min(self.policy.retry_max_secs)
            .min(MAX_BACKOFF_SECS);
        Duration::seconds(secs as i64)
    }

    pub fn revert(&self, id: Uuid) -> Result<Trial> {
        let mut book = self.book();
        let current = book.get(id)?;
        if !current.is_resolved() {
            return Err(invalid_state(id, "pending", "revert"));
        }
        if current.reverted {
            return Err(invalid_state(id, "already reverted", "revert"));
        }
        let mut updated = current.clone();
        updated.reverted = true;

        let now = self.clock.now();
        let detail = format!("reverted after {}", updated.status());
        book.commit(
            vec![updated.clone()],
            vec![Draft::new(id, AuditEvent::Reverted, now, detail)],
        )?;
        info!(id = %id, "trial reverted");
        Ok(updated)
    }

    pub fn note(&self, id: Uuid, text: &str) -> Result<Trial> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CanaryError::validation("note must not be empty"));
        }
        let mut book = self.book();
        let mut updated = book.get(id)?.clone();
        updated.notes.push(text.to_string());
        if updated.is_resolved() {
            updated.noted_after_verdict = true;
        }

        let now = self.clock.now();
        book.commit(
            vec![updated.clone()],
            vec![Draft::new(id, AuditEvent::NoteAdded, now, text)],
        )?;
        Ok(updated)
    }

    /// Start a new trial of the same change against a fresh baseline.
    pub fn followup(&self, id: Uuid, check_after_sec: Option<i64>) -> Result<Trial> {
        let source = self.book().get(id)?.clone();
        if !source.is_resolved() {
            return Err(invalid_state(id, "pending", "follow up"));
        }
        let secs = validate_check_after(
            check_after_sec.unwrap_or(source.check_after_sec as i64),
        )?;

        let before = self.metrics.resolve(&source.metric_name)?;
        let now = self.clock.now();

        let mut child = NewTrial {
            action: source.action.clone(),
            context: source.context.clone(),
            metric_name: source.metric_name.clone(),
            direction: source.direction,
            check_after_sec: secs as i64,
            expected_delta: source.expected_delta,
            tags: source.tags.iter().cloned().collect(),
            notes: None,
            created_by: Some(source.created_by.clone()),
        }
        .into_trial(before, now);
        child.parent_id = Some(source.id);

        self.book().commit(
            vec![child.clone()],
            vec![
                Draft::new(id, AuditEvent::FollowupCreated, now, child.id.to_string()),
                Draft::new(child.id, AuditEvent::Created, now, format!("follow-up of {id}")),
            ],
        )?;
        info!(id = %child.id, parent = %id, "follow-up trial created");
        Ok(child)
    }

    // -- Queries -----------------------------------------------------------

    pub fn get(&self, id: Uuid) -> Result<Trial> {
        self.book().get(id).cloned()
    }

    pub fn detail(&self, id: Uuid) -> Result<TrialDetail> {
        let book = self.book();
        let trial = book.get(id)?.clone();
        let audit = book.audit.get(&id).cloned().unwrap_or_default();
        Ok(TrialDetail { trial, audit })
    }

    /// All trials in creation order.
    pub fn list(&self) -> Vec<Trial> {
        self.book().trials.clone()
    }

    /// Point-in-time copy for readers that must not see later mutations.
    pub fn snapshot(&self) -> Arc<[Trial]> {
        self.book().trials.clone().into()
    }

    pub fn inbox(&self, tab: InboxTab, limit: usize) -> Inbox {
        let now = self.clock.now();
        inbox::build(self.list(), tab, limit, now, self.policy.alert_after_failures)
    }
}

fn invalid_state(id: Uuid, state: &str, operation: &str) -> CanaryError {
    CanaryError::InvalidState {
        id: id.to_string(),
        state: state.to_string(),
        operation: operation.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
