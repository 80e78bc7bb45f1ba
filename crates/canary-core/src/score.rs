//! Survival scores: how often a kind of change survives its canary trial.
//!
//! Trials are grouped by a normalized action template and tag, so
//! "raise pool size to 40" and "raise pool size to 64" count as the same
//! kind of change.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::trial::Trial;

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

pub trait TemplateNormalizer: Send + Sync {
    fn normalize(&self, action: &str) -> String;
}

static UUID_RE: OnceLock<Regex> = OnceLock::new();
static HEX_RE: OnceLock<Regex> = OnceLock::new();
static NUMBER_RE: OnceLock<Regex> = OnceLock::new();
static SPACE_RE: OnceLock<Regex> = OnceLock::new();

/// Lowercases and replaces volatile tokens with placeholders:
/// UUIDs become `{id}`, hex runs of 7+ characters `{hash}`, digit runs `{n}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNormalizer;

impl TemplateNormalizer for DefaultNormalizer {
    fn normalize(&self, action: &str) -> String {
        let uuid = UUID_RE.get_or_init(|| {
            Regex::new(r"\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b").unwrap()
        });
        let hex = HEX_RE.get_or_init(|| Regex::new(r"\b[0-9a-f]{7,}\b").unwrap());
        let number = NUMBER_RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());
        let space = SPACE_RE.get_or_init(|| Regex::new(r"\s+").unwrap());

        let lower = action.trim().to_lowercase();
        let out = uuid.replace_all(&lower, "{id}");
        // Only mixed letter/digit runs are hashes; "defaced" is a word and
        // "1234567" is a number.
        let out = hex.replace_all(&out, |caps: &regex::Captures| {
            let token = &caps[0];
            let digits = token.bytes().any(|b| b.is_ascii_digit());
            let letters = token.bytes().any(|b| b.is_ascii_alphabetic());
            if digits && letters {
                "{hash}".to_string()
            } else {
                token.to_string()
            }
        });
        let out = number.replace_all(&out, "{n}");
        space.replace_all(&out, " ").into_owned()
    }
}

// ---------------------------------------------------------------------------
// SurvivalScore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalScore {
    pub action_template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    pub survived_count: u32,
    pub failed_count: u32,
    /// `survived_count / (survived_count + failed_count)`, in `[0, 1]`.
    pub survival_rate: f64,
}

impl SurvivalScore {
    pub fn total(&self) -> u32 {
        self.survived_count + self.failed_count
    }
}

// ---------------------------------------------------------------------------
// ScoreBoard
// ---------------------------------------------------------------------------

pub struct ScoreBoard {
    normalizer: Box<dyn TemplateNormalizer>,
}

impl Default for ScoreBoard {
    fn default() -> Self {
        Self::new(Box::new(DefaultNormalizer))
    }
}

impl ScoreBoard {
    pub fn new(normalizer: Box<dyn TemplateNormalizer>) -> Self {
        Self { normalizer }
    }

    pub fn template(&self, action: &str) -> String {
        self.normalizer.normalize(action)
    }

    /// Aggregate resolved trials into at most `limit` scores, best first.
    /// Reverted trials still count with the verdict they received.
    pub fn scores(&self, trials: &[Trial], limit: usize) -> Vec<SurvivalScore> {
        let mut groups: BTreeMap<(String, Option<String>), (u32, u32)> = BTreeMap::new();

        for trial in trials {
            let Some(survived) = trial.survived else {
                continue;
            };
            let template = self.normalizer.normalize(&trial.action);
            let keys: Vec<Option<String>> = if trial.tags.is_empty() {
                vec![None]
            } else {
                trial.tags.iter().cloned().map(Some).collect()
            };
            for tag in keys {
                let counts = groups.entry((template.clone(), tag)).or_default();
                if survived {
                    counts.0 += 1;
                } else {
                    counts.1 += 1;
                }
            }
        }

        let mut scores: Vec<SurvivalScore> = groups
            .into_iter()
            .map(|((action_template, tag), (survived_count, failed_count))| SurvivalScore {
                action_template,
                tag,
                survived_count,
                failed_count,
                survival_rate: f64::from(survived_count)
                    / f64::from(survived_count + failed_count),
            })
            .collect();

        scores.sort_by(|a, b| {
            b.survival_rate
                .partial_cmp(&a.survival_rate)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.total().cmp(&a.total()))
                .then_with(|| a.action_template.cmp(&b.action_template))
                .then_with(|| a.tag.cmp(&b.tag))
        });
        scores.truncate(limit);
        scores
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
