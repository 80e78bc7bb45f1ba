//! Canary trials: record a metric before a change, measure it again after a
//! delay, and decide whether the change survived.
//!
//! `TrialEngine` owns the live set of trials and their audit trail; storage
//! goes through `TrialStore` (`TrialDb` on disk, `MemoryTrialStore` in
//! tests).

pub mod audit;
pub mod db;
pub mod engine;
pub mod inbox;
pub mod model;
pub mod store;
pub mod verdict;

pub use audit::{AuditEntry, AuditEvent};
pub use db::TrialDb;
pub use engine::{CheckReport, LookupFailure, TrialDetail, TrialEngine};
pub use inbox::{Inbox, InboxCounts, InboxItem, InboxTab};
pub use model::{NewTrial, Trial, TrialStatus};
pub use store::{MemoryTrialStore, StoredTrials, TrialStore};
