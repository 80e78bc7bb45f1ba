//! Persistent trial storage using redb.
//!
//! # Table design
//!
//! ```text
//! trials: uuid bytes (16)      -> JSON-encoded Trial
//! audit:  seq (u64, ascending) -> JSON-encoded AuditEntry
//! ```
//!
//! Trial rows are overwritten in place on every change. Audit rows are
//! append-only; writing an existing `seq` is refused. Each `record` call is
//! one write transaction, so a trial update and its audit entries commit or
//! roll back together.

use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use super::audit::AuditEntry;
use super::model::Trial;
use super::store::{StoredTrials, TrialStore};
use crate::error::{CanaryError, Result};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const TRIALS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("trials");
const AUDIT: TableDefinition<u64, &[u8]> = TableDefinition::new("audit");

fn db_err(e: impl std::fmt::Display) -> CanaryError {
    CanaryError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// TrialDb
// ---------------------------------------------------------------------------

pub struct TrialDb {
    db: Database,
}

impl TrialDb {
    /// Open or create the database at `path`, creating both tables.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(TRIALS).map_err(db_err)?;
        wt.open_table(AUDIT).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        Ok(Self { db })
    }
}

impl TrialStore for TrialDb {
    fn load(&self) -> Result<StoredTrials> {
        let rt = self.db.begin_read().map_err(db_err)?;

        let trials_table = rt.open_table(TRIALS).map_err(db_err)?;
        let mut trials = Vec::new();
        for row in trials_table.iter().map_err(db_err)? {
            let (_, v) = row.map_err(db_err)?;
            let trial: Trial = serde_json::from_slice(v.value()).map_err(db_err)?;
            trials.push(trial);
        }

        let audit_table = rt.open_table(AUDIT).map_err(db_err)?;
        let mut audit = Vec::new();
        for row in audit_table.iter().map_err(db_err)? {
            let (_, v) = row.map_err(db_err)?;
            let entry: AuditEntry = serde_json::from_slice(v.value()).map_err(db_err)?;
            audit.push(entry);
        }

        Ok(StoredTrials { trials, audit })
    }

    fn record(&mut self, trials: &[Trial], entries: &[AuditEntry]) -> Result<()> {
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut table = wt.open_table(TRIALS).map_err(db_err)?;
            for trial in trials {
                let value = serde_json::to_vec(trial).map_err(db_err)?;
                table
                    .insert(trial.id.as_bytes().as_slice(), value.as_slice())
                    .map_err(db_err)?;
            }
        }
        {
            let mut table = wt.open_table(AUDIT).map_err(db_err)?;
            for entry in entries {
                if table.get(entry.seq).map_err(db_err)?.is_some() {
                    // Dropping `wt` without commit aborts the whole batch.
                    return Err(CanaryError::Store(format!(
                        "audit entry {} already exists",
                        entry.seq
                    )));
                }
                let value = serde_json::to_vec(entry).map_err(db_err)?;
                table.insert(entry.seq, value.as_slice()).map_err(db_err)?;
            }
        }
        wt.commit().map_err(db_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trial::audit::AuditEvent;
    use crate::trial::model::NewTrial;
    use chrono::Utc;
    use tempfile::TempDir;

    fn open_tmp() -> (TempDir, TrialDb) {
        let dir = TempDir::new().unwrap();
        let db = TrialDb::open(&dir.path().join(".canary/canary.db")).unwrap();
        (dir, db)
    }

    fn created(trial: &Trial, seq: u64) -> AuditEntry {
        AuditEntry {
            seq,
            trial_id: trial.id,
            event: AuditEvent::Created,
            at: trial.created_at,
            detail: Some("created".into()),
        }
    }

    #[test]
    fn empty_db_loads_nothing() {
        let (_dir, db) = open_tmp();
        let loaded = db.load().unwrap();
        assert!(loaded.trials.is_empty());
        assert!(loaded.audit.is_empty());
    }

    #[test]
    fn record_round_trips_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("canary.db");
        let trial = NewTrial::new("bump pool", "db", "conn_wait_ms", 60).into_trial(12.5, Utc::now());
        {
            let mut db = TrialDb::open(&path).unwrap();
            db.record(&[trial.clone()], &[created(&trial, 0)]).unwrap();
        }

        let db = TrialDb::open(&path).unwrap();
        let loaded = db.load().unwrap();
        assert_eq!(loaded.trials, vec![trial.clone()]);
        assert_eq!(loaded.audit.len(), 1);
        assert_eq!(loaded.audit[0].trial_id, trial.id);
    }

    #[test]
    fn record_overwrites_trial_rows() {
        let (_dir, mut db) = open_tmp();
        let trial = NewTrial::new("a", "c", "m", 60).into_trial(1.0, Utc::now());
        db.record(&[trial.clone()], &[created(&trial, 0)]).unwrap();

        let mut updated = trial.clone();
        updated.notes.push("looks fine".into());
        db.record(&[updated], &[]).unwrap();

        let loaded = db.load().unwrap();
        assert_eq!(loaded.trials.len(), 1);
        assert_eq!(loaded.trials[0].notes, vec!["looks fine".to_string()]);
    }

    #[test]
    fn audit_rows_are_append_only_and_batch_aborts() {
        let (_dir, mut db) = open_tmp();
        let first = NewTrial::new("a", "c", "m", 60).into_trial(1.0, Utc::now());
        db.record(&[first.clone()], &[created(&first, 0)]).unwrap();

        let second = NewTrial::new("b", "c", "m", 60).into_trial(1.0, Utc::now());
        let err = db
            .record(&[second.clone()], &[created(&second, 0)])
            .unwrap_err();
        assert!(matches!(err, CanaryError::Store(_)));

        let loaded = db.load().unwrap();
        assert_eq!(loaded.trials.len(), 1, "trial row must roll back with audit");
        assert_eq!(loaded.trials[0].id, first.id);
    }

    #[test]
    fn audit_loads_in_seq_order() {
        let (_dir, mut db) = open_tmp();
        let trial = NewTrial::new("a", "c", "m", 60).into_trial(1.0, Utc::now());
        for seq in [5u64, 1, 3] {
            db.record(&[trial.clone()], &[created(&trial, seq)]).unwrap();
        }
        let seqs: Vec<u64> = db.load().unwrap().audit.iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![1, 3, 5]);
    }
}
