use crate::error::CanaryError;
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// RiskTier
// ---------------------------------------------------------------------------

/// Declared or assessed risk of a task. Ordered from least to most dangerous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub fn all() -> &'static [RiskTier] {
        &[
            RiskTier::Low,
            RiskTier::Medium,
            RiskTier::High,
            RiskTier::Critical,
        ]
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
            RiskTier::Critical => "critical",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskTier {
    type Err = CanaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(RiskTier::Low),
            "medium" => Ok(RiskTier::Medium),
            "high" => Ok(RiskTier::High),
            "critical" => Ok(RiskTier::Critical),
            _ => Err(CanaryError::validation(format!(
                "unknown risk tier '{s}': must be low, medium, high, or critical"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Upstream inputs
// ---------------------------------------------------------------------------

/// A unit of proposed work, as submitted by the upstream planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub risk_tier: RiskTier,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl Task {
    pub fn new(id: impl Into<String>, risk_tier: RiskTier) -> Self {
        Self {
            id: id.into(),
            risk_tier,
            params: serde_json::Value::Null,
        }
    }
}

/// Output of the external risk scorer. Only `tier` drives the commit state;
/// `score` and `reasons` are echoed into the justification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub tier: RiskTier,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl RiskAssessment {
    pub fn new(tier: RiskTier) -> Self {
        Self {
            tier,
            score: None,
            reasons: Vec::new(),
        }
    }
}

/// Output of the external decision engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Confidence in the interpreted intent, 0.0 ..= 1.0.
    pub confidence: f64,
    /// True when the upstream parser left an ambiguity unresolved.
    #[serde(default)]
    pub needs_clarification: bool,
}

impl Decision {
    pub fn new(confidence: f64) -> Self {
        Self {
            confidence,
            needs_clarification: false,
        }
    }
}

// ---------------------------------------------------------------------------
// CommitState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitState {
    NeedsConfirm,
    Blocked,
    ActionReady,
    Executed,
    Cancelled,
}

impl CommitState {
    pub fn as_str(self) -> &'static str {
        match self {
            CommitState::NeedsConfirm => "needs_confirm",
            CommitState::Blocked => "blocked",
            CommitState::ActionReady => "action_ready",
            CommitState::Executed => "executed",
            CommitState::Cancelled => "cancelled",
        }
    }

    /// States a queued action may move into from `self`.
    ///
    /// `ActionReady` and `Executed` only move forward; `Blocked`, `Cancelled`
    /// and `Executed` accept nothing. Re-evaluation means a fresh decision.
    pub fn can_transition_to(self, next: CommitState) -> bool {
        use CommitState::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (NeedsConfirm, ActionReady)
                | (NeedsConfirm, Cancelled)
                | (NeedsConfirm, Blocked)
                | (ActionReady, Executed)
                | (ActionReady, Cancelled)
        )
    }
}

impl fmt::Display for CommitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommitState {
    type Err = CanaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "needs_confirm" => Ok(CommitState::NeedsConfirm),
            "blocked" => Ok(CommitState::Blocked),
            "action_ready" => Ok(CommitState::ActionReady),
            "executed" => Ok(CommitState::Executed),
            "cancelled" => Ok(CommitState::Cancelled),
            _ => Err(CanaryError::validation(format!(
                "unknown commit state '{s}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// MetricDirection
// ---------------------------------------------------------------------------

/// Which way a metric moves when things get better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDirection {
    #[default]
    HigherIsBetter,
    LowerIsBetter,
}

impl MetricDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricDirection::HigherIsBetter => "higher_is_better",
            MetricDirection::LowerIsBetter => "lower_is_better",
        }
    }

    /// Multiplier that turns a raw `after - before` change into an
    /// improvement (positive = better).
    pub fn sign(self) -> f64 {
        match self {
            MetricDirection::HigherIsBetter => 1.0,
            MetricDirection::LowerIsBetter => -1.0,
        }
    }
}

impl fmt::Display for MetricDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricDirection {
    type Err = CanaryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "higher_is_better" | "higher" | "up" => Ok(MetricDirection::HigherIsBetter),
            "lower_is_better" | "lower" | "down" => Ok(MetricDirection::LowerIsBetter),
            _ => Err(CanaryError::validation(format!(
                "unknown metric direction '{s}': must be higher_is_better or lower_is_better"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_tiers_are_ordered() {
        assert!(RiskTier::Low < RiskTier::Medium);
        assert!(RiskTier::Medium < RiskTier::High);
        assert!(RiskTier::High < RiskTier::Critical);
    }

    #[test]
    fn risk_tier_parse_roundtrip() {
        for &tier in RiskTier::all() {
            let parsed: RiskTier = tier.as_str().parse().unwrap();
            assert_eq!(parsed, tier);
        }
        assert!("severe".parse::<RiskTier>().is_err());
    }

    #[test]
    fn commit_state_forward_only() {
        use CommitState::*;
        assert!(NeedsConfirm.can_transition_to(ActionReady));
        assert!(ActionReady.can_transition_to(Executed));
        assert!(!ActionReady.can_transition_to(NeedsConfirm));
        assert!(!Executed.can_transition_to(ActionReady));
        assert!(!Blocked.can_transition_to(ActionReady));
        assert!(!Cancelled.can_transition_to(NeedsConfirm));
        assert!(Blocked.can_transition_to(Blocked));
    }

    #[test]
    fn commit_state_serializes_snake_case() {
        let json = serde_json::to_string(&CommitState::NeedsConfirm).unwrap();
        assert_eq!(json, "\"needs_confirm\"");
        let parsed: CommitState = "action_ready".parse().unwrap();
        assert_eq!(parsed, CommitState::ActionReady);
    }

    #[test]
    fn direction_sign() {
        assert_eq!(MetricDirection::HigherIsBetter.sign(), 1.0);
        assert_eq!(MetricDirection::LowerIsBetter.sign(), -1.0);
        assert_eq!(
            "lower".parse::<MetricDirection>().unwrap(),
            MetricDirection::LowerIsBetter
        );
    }
}
