//! Append-only audit trail for trial lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEvent {
    Created,
    Resolved,
    Reverted,
    NoteAdded,
    FollowupCreated,
}

impl AuditEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditEvent::Created => "created",
            AuditEvent::Resolved => "resolved",
            AuditEvent::Reverted => "reverted",
            AuditEvent::NoteAdded => "note_added",
            AuditEvent::FollowupCreated => "followup_created",
        }
    }
}

impl fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable lifecycle record. `seq` is unique and increasing across the
/// whole store, so ordering never depends on timestamp resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub seq: u64,
    pub trial_id: Uuid,
    pub event: AuditEvent,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_event_wire_names() {
        let json = serde_json::to_string(&AuditEvent::FollowupCreated).unwrap();
        assert_eq!(json, "\"followup_created\"");
        assert_eq!(AuditEvent::NoteAdded.to_string(), "note_added");
    }

    #[test]
    fn audit_entry_omits_empty_detail() {
        let entry = AuditEntry {
            seq: 7,
            trial_id: Uuid::new_v4(),
            event: AuditEvent::Created,
            at: Utc::now(),
            detail: None,
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert!(json.get("detail").is_none());
        assert_eq!(json["event"], "created");
        assert_eq!(json["seq"], 7);
    }
}
