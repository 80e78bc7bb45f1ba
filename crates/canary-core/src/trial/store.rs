//! Durable storage seam for the trial engine.

use std::collections::BTreeMap;

use uuid::Uuid;

use super::audit::AuditEntry;
use super::model::Trial;
use crate::error::Result;

/// Everything a store hands back on open.
#[derive(Debug, Clone, Default)]
pub struct StoredTrials {
    pub trials: Vec<Trial>,
    /// Ascending by `seq`.
    pub audit: Vec<AuditEntry>,
}

/// Persistence for trials and their audit trail.
///
/// `record` must be all-or-nothing: either every trial upsert and audit
/// append lands, or none do. The engine only updates its in-memory view
/// after `record` returns `Ok`.
pub trait TrialStore: Send {
    fn load(&self) -> Result<StoredTrials>;

    fn record(&mut self, trials: &[Trial], entries: &[AuditEntry]) -> Result<()>;
}

/// Non-durable store used by tests and by hosts that do not need restarts.
#[derive(Debug, Default)]
pub struct MemoryTrialStore {
    trials: BTreeMap<Uuid, Trial>,
    audit: BTreeMap<u64, AuditEntry>,
}

impl MemoryTrialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TrialStore for MemoryTrialStore {
    fn load(&self) -> Result<StoredTrials> {
        Ok(StoredTrials {
            trials: self.trials.values().cloned().collect(),
            audit: self.audit.values().cloned().collect(),
        })
    }

    fn record(&mut self, trials: &[Trial], entries: &[AuditEntry]) -> Result<()> {
        for trial in trials {
            self.trials.insert(trial.id, trial.clone());
        }
        for entry in entries {
            self.audit.insert(entry.seq, entry.clone());
        }
        Ok(())
    }
}
