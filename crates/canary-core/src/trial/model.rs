use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CanaryError, Result};
use crate::types::MetricDirection;

/// Trials longer than this are almost certainly a unit mistake (ms vs s).
pub const MAX_CHECK_AFTER_SECS: u64 = 90 * 24 * 3600;

pub const DEFAULT_CREATED_BY: &str = "operator";

// ---------------------------------------------------------------------------
// Trial
// ---------------------------------------------------------------------------

/// A before/after measurement around one applied change.
///
/// `metric_after`, `survived` and `checked_at` are always set together; a
/// trial is either unresolved or carries its full verdict. Reverting never
/// touches the verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub id: Uuid,
    pub action: String,
    pub context: String,
    pub metric_name: String,
    #[serde(default)]
    pub direction: MetricDirection,
    pub metric_before: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_after: Option<f64>,
    /// `None` means the change only has to avoid regressing the metric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_delta: Option<f64>,
    pub check_after_sec: u64,
    pub created_at: DateTime<Utc>,
    pub check_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub survived: Option<bool>,
    #[serde(default)]
    pub reverted: bool,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub notes: Vec<String>,
    pub created_by: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    /// An operator note was recorded after the verdict came in.
    #[serde(default)]
    pub noted_after_verdict: bool,
    #[serde(default)]
    pub resolve_failures: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Pending,
    Survived,
    Failed,
}

impl std::fmt::Display for TrialStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrialStatus::Pending => f.write_str("pending"),
            TrialStatus::Survived => f.write_str("survived"),
            TrialStatus::Failed => f.write_str("failed"),
        }
    }
}

impl Trial {
    pub fn status(&self) -> TrialStatus {
        match self.survived {
            None => TrialStatus::Pending,
            Some(true) => TrialStatus::Survived,
            Some(false) => TrialStatus::Failed,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.checked_at.is_some()
    }

    /// Unresolved and past its check time.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.is_resolved() && now >= self.check_at
    }

    /// Due and not waiting out a retry backoff.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.is_due(now) && self.retry_at.map_or(true, |at| now >= at)
    }

    /// Copy of this trial carrying a verdict. All verdict fields are set in
    /// one step.
    pub(crate) fn resolved(&self, after: f64, survived: bool, at: DateTime<Utc>) -> Trial {
        let mut next = self.clone();
        next.metric_after = Some(after);
        next.survived = Some(survived);
        next.checked_at = Some(at);
        next.last_error = None;
        next.retry_at = None;
        next
    }

    /// Copy of this trial recording a failed metric lookup and the time of
    /// the next attempt.
    pub(crate) fn lookup_failed(&self, error: String, retry_at: DateTime<Utc>) -> Trial {
        let mut next = self.clone();
        next.resolve_failures = next.resolve_failures.saturating_add(1);
        next.last_error = Some(error);
        next.retry_at = Some(retry_at);
        next
    }
}

// ---------------------------------------------------------------------------
// NewTrial
// ---------------------------------------------------------------------------

/// Caller input for a new trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTrial {
    pub action: String,
    pub context: String,
    pub metric_name: String,
    #[serde(default)]
    pub direction: MetricDirection,
    /// Signed so that negative input is reported as a validation error
    /// rather than a deserialization failure.
    pub check_after_sec: i64,
    #[serde(default)]
    pub expected_delta: Option<f64>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
}

impl NewTrial {
    pub fn new(
        action: impl Into<String>,
        context: impl Into<String>,
        metric_name: impl Into<String>,
        check_after_sec: i64,
    ) -> Self {
        Self {
            action: action.into(),
            context: context.into(),
            metric_name: metric_name.into(),
            direction: MetricDirection::default(),
            check_after_sec,
            expected_delta: None,
            tags: Vec::new(),
            notes: None,
            created_by: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("action", &self.action),
            ("context", &self.context),
            ("metric_name", &self.metric_name),
        ] {
            if value.trim().is_empty() {
                return Err(CanaryError::validation(format!("{field} must not be empty")));
            }
        }
        validate_check_after(self.check_after_sec)?;
        if let Some(delta) = self.expected_delta {
            if !delta.is_finite() {
                return Err(CanaryError::validation(format!(
                    "expected_delta must be a finite number, got {delta}"
                )));
            }
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(CanaryError::validation("tags must not be empty strings"));
        }
        Ok(())
    }

    /// Build the stored record. Call after [`NewTrial::validate`].
    pub(crate) fn into_trial(self, metric_before: f64, now: DateTime<Utc>) -> Trial {
        let check_after_sec = self.check_after_sec.max(1) as u64;
        Trial {
            id: Uuid::new_v4(),
            action: self.action.trim().to_string(),
            context: self.context.trim().to_string(),
            metric_name: self.metric_name.trim().to_string(),
            direction: self.direction,
            metric_before,
            metric_after: None,
            expected_delta: self.expected_delta,
            check_after_sec,
            created_at: now,
            check_at: now + Duration::seconds(check_after_sec as i64),
            checked_at: None,
            survived: None,
            reverted: false,
            tags: self.tags.into_iter().map(|t| t.trim().to_string()).collect(),
            notes: self
                .notes
                .filter(|n| !n.trim().is_empty())
                .into_iter()
                .collect(),
            created_by: self
                .created_by
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CREATED_BY.to_string()),
            parent_id: None,
            noted_after_verdict: false,
            resolve_failures: 0,
            last_error: None,
            retry_at: None,
        }
    }
}

pub(crate) fn validate_check_after(secs: i64) -> Result<u64> {
    if secs <= 0 {
        return Err(CanaryError::validation(format!(
            "check_after_sec must be a positive number of seconds, got {secs}"
        )));
    }
    let secs = secs as u64;
    if secs > MAX_CHECK_AFTER_SECS {
        return Err(CanaryError::validation(format!(
            "check_after_sec must be at most {MAX_CHECK_AFTER_SECS}, got {secs}"
        )));
    }
    Ok(secs)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_non_positive_delay() {
        for secs in [0, -1, -300] {
            let err = NewTrial::new("a", "c", "m", secs).validate().unwrap_err();
            assert!(matches!(err, CanaryError::Validation(_)), "{secs}");
        }
        assert!(NewTrial::new("a", "c", "m", 1).validate().is_ok());
    }

    #[test]
    fn validate_rejects_absurd_delay_and_blank_fields() {
        let too_long = (MAX_CHECK_AFTER_SECS + 1) as i64;
        assert!(NewTrial::new("a", "c", "m", too_long).validate().is_err());
        assert!(NewTrial::new("  ", "c", "m", 60).validate().is_err());
        assert!(NewTrial::new("a", "", "m", 60).validate().is_err());
        assert!(NewTrial::new("a", "c", "\t", 60).validate().is_err());
    }

    #[test]
    fn validate_rejects_non_finite_delta() {
        let mut input = NewTrial::new("a", "c", "m", 60);
        input.expected_delta = Some(f64::INFINITY);
        assert!(input.validate().is_err());
    }

    #[test]
    fn into_trial_derives_check_at_and_defaults() {
        let now = Utc::now();
        let mut input = NewTrial::new(" enable cache ", "api", "p99_ms", 300);
        input.tags = vec!["perf".to_string(), "perf".to_string(), "api".to_string()];
        input.notes = Some("   ".to_string());
        let trial = input.into_trial(120.0, now);

        assert_eq!(trial.action, "enable cache");
        assert_eq!(trial.check_at, now + Duration::seconds(300));
        assert_eq!(trial.tags.len(), 2);
        assert!(trial.notes.is_empty());
        assert_eq!(trial.created_by, DEFAULT_CREATED_BY);
        assert_eq!(trial.status(), TrialStatus::Pending);
        assert!(!trial.is_due(now));
        assert!(trial.is_due(now + Duration::seconds(300)));
    }

    #[test]
    fn resolved_sets_verdict_fields_together() {
        let now = Utc::now();
        let trial = NewTrial::new("a", "c", "m", 60).into_trial(1.0, now);
        let failed = trial.lookup_failed("timeout".to_string(), now + Duration::seconds(30));
        assert_eq!(failed.resolve_failures, 1);
        assert!(!failed.is_eligible(now + Duration::seconds(60) - Duration::seconds(1)));

        let done = failed.resolved(2.0, true, now + Duration::seconds(90));
        assert_eq!(done.metric_after, Some(2.0));
        assert_eq!(done.survived, Some(true));
        assert!(done.checked_at.is_some());
        assert!(done.last_error.is_none());
        assert!(done.retry_at.is_none());
        assert!(!done.is_due(now + Duration::days(1)));
    }

    #[test]
    fn new_trial_deserializes_with_defaults() {
        let input: NewTrial = serde_json::from_str(
            r#"{"action":"a","context":"c","metric_name":"m","check_after_sec":30}"#,
        )
        .unwrap();
        assert_eq!(input.direction, MetricDirection::HigherIsBetter);
        assert!(input.tags.is_empty());
        assert!(input.expected_delta.is_none());
    }
}
