use crate::error::{CanaryError, Result};
use crate::paths;
use crate::types::RiskTier;
use serde::{Deserialize, Serialize};
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// CommitPolicy
// ---------------------------------------------------------------------------

/// Thresholds the commit controller applies to every task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitPolicy {
    /// Minimum decision confidence for auto-execution.
    #[serde(default = "default_auto_execute_confidence")]
    pub auto_execute_confidence: f64,
    /// Highest risk tier that may auto-execute.
    #[serde(default = "default_auto_execute_max_tier")]
    pub auto_execute_max_tier: RiskTier,
    /// Tiers strictly above this ceiling are blocked outright.
    #[serde(default = "default_block_above")]
    pub block_above: RiskTier,
    /// Grace period before an auto-executed action becomes ready.
    #[serde(default = "default_countdown_secs")]
    pub default_countdown_secs: u64,
}

fn default_auto_execute_confidence() -> f64 {
    0.8
}

fn default_auto_execute_max_tier() -> RiskTier {
    RiskTier::Medium
}

fn default_block_above() -> RiskTier {
    RiskTier::High
}

fn default_countdown_secs() -> u64 {
    10
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self {
            auto_execute_confidence: default_auto_execute_confidence(),
            auto_execute_max_tier: default_auto_execute_max_tier(),
            block_above: default_block_above(),
            default_countdown_secs: default_countdown_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// TrialPolicy
// ---------------------------------------------------------------------------

/// Scheduling and verdict settings for the trial engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialPolicy {
    /// How far a metric may worsen, in metric units, and still survive when
    /// no expected delta was given. 0.0 means equal-or-better.
    #[serde(default)]
    pub regress_tolerance: f64,
    /// Seconds between scheduler scans.
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    /// First retry delay after a metric lookup fails; doubles per failure.
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,
    #[serde(default = "default_retry_max_secs")]
    pub retry_max_secs: u64,
    /// Consecutive lookup failures after which every failure is logged as an
    /// operational alert.
    #[serde(default = "default_alert_after_failures")]
    pub alert_after_failures: u32,
    /// Default page size for inbox and score queries.
    #[serde(default = "default_list_limit")]
    pub default_limit: usize,
}

fn default_tick_interval_secs() -> u64 {
    30
}

fn default_retry_base_secs() -> u64 {
    30
}

fn default_retry_max_secs() -> u64 {
    3600
}

/// Longest retry delay `trial.retry_max_secs` may ask for: 30 days.
pub const MAX_RETRY_SECS: u64 = 30 * 24 * 3600;

fn default_alert_after_failures() -> u32 {
    5
}

fn default_list_limit() -> usize {
    50
}

impl Default for TrialPolicy {
    fn default() -> Self {
        Self {
            regress_tolerance: 0.0,
            tick_interval_secs: default_tick_interval_secs(),
            retry_base_secs: default_retry_base_secs(),
            retry_max_secs: default_retry_max_secs(),
            alert_after_failures: default_alert_after_failures(),
            default_limit: default_list_limit(),
        }
    }
}

// ---------------------------------------------------------------------------
// MetricsConfig
// ---------------------------------------------------------------------------

/// Where metric values come from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricsConfig {
    /// `.canary/metrics.yaml`, re-read on every lookup.
    #[default]
    File,
    /// `GET {base_url}/{metric}` returning `{"value": <number>}`.
    Http {
        base_url: String,
        #[serde(default = "default_http_timeout_secs")]
        timeout_secs: u64,
    },
}

fn default_http_timeout_secs() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: u32,
    #[serde(default)]
    pub commit: CommitPolicy,
    #[serde(default)]
    pub trial: TrialPolicy,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 1,
            commit: CommitPolicy::default(),
            trial: TrialPolicy::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(CanaryError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Load the config for running the controller, engine or server.
    /// Errors from [`Config::validate`] are refused; warnings are logged.
    pub fn load_checked(root: &Path) -> Result<Self> {
        let cfg = Self::load(root)?;
        cfg.ensure_usable()?;
        Ok(cfg)
    }

    /// Like [`Config::load_checked`], falling back to defaults when the
    /// project has not been initialized.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        match Self::load_checked(root) {
            Ok(cfg) => Ok(cfg),
            Err(CanaryError::NotInitialized) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn ensure_usable(&self) -> Result<()> {
        let mut errors = Vec::new();
        for w in self.validate() {
            match w.level {
                WarnLevel::Warning => tracing::warn!(warning = %w.message, "config warning"),
                WarnLevel::Error => errors.push(w.message),
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(CanaryError::Validation(format!(
                "invalid config.yaml: {}",
                errors.join("; ")
            )))
        }
    }

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let commit = &self.commit;

        if !(0.0..=1.0).contains(&commit.auto_execute_confidence) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "commit.auto_execute_confidence must be within 0.0..=1.0, got {}",
                    commit.auto_execute_confidence
                ),
            });
        }

        // Auto-execution above the block ceiling can never happen.
        if commit.auto_execute_max_tier > commit.block_above {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "commit.auto_execute_max_tier ({}) is above commit.block_above ({}); \
                     tiers above {} are still blocked",
                    commit.auto_execute_max_tier, commit.block_above, commit.block_above
                ),
            });
        }

        let trial = &self.trial;
        if !trial.regress_tolerance.is_finite() || trial.regress_tolerance < 0.0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "trial.regress_tolerance must be a non-negative number, got {}",
                    trial.regress_tolerance
                ),
            });
        }
        if trial.tick_interval_secs == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "trial.tick_interval_secs must be at least 1".to_string(),
            });
        }
        if trial.retry_max_secs > MAX_RETRY_SECS {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!(
                    "trial.retry_max_secs must be at most {MAX_RETRY_SECS}, got {}",
                    trial.retry_max_secs
                ),
            });
        }
        if trial.retry_base_secs > trial.retry_max_secs {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!(
                    "trial.retry_base_secs ({}) exceeds trial.retry_max_secs ({})",
                    trial.retry_base_secs, trial.retry_max_secs
                ),
            });
        }
        if trial.default_limit == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "trial.default_limit is 0; listings will be empty".to_string(),
            });
        }

        if let MetricsConfig::Http { base_url, .. } = &self.metrics {
            if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Error,
                    message: format!("metrics.base_url '{base_url}' is not an http(s) URL"),
                });
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn load_missing_is_not_initialized() {
        let dir = TempDir::new().unwrap();
        let err = Config::load(dir.path()).unwrap_err();
        assert!(matches!(err, CanaryError::NotInitialized));
    }

    #[test]
    fn load_or_default_falls_back() {
        let dir = TempDir::new().unwrap();
        let cfg = Config::load_or_default(dir.path()).unwrap();
        assert_eq!(cfg.commit, CommitPolicy::default());
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut cfg = Config::default();
        cfg.trial.regress_tolerance = 0.5;
        cfg.metrics = MetricsConfig::Http {
            base_url: "http://localhost:9100".to_string(),
            timeout_secs: 3,
        };
        cfg.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.trial.regress_tolerance, 0.5);
        assert_eq!(loaded.metrics, cfg.metrics);
    }

    #[test]
    fn sparse_yaml_fills_defaults() {
        let cfg: Config = serde_yaml::from_str("version: 1\ncommit:\n  block_above: critical\n").unwrap();
        assert_eq!(cfg.commit.block_above, RiskTier::Critical);
        assert_eq!(cfg.commit.default_countdown_secs, 10);
        assert_eq!(cfg.trial.tick_interval_secs, 30);
        assert_eq!(cfg.metrics, MetricsConfig::File);
    }

    #[test]
    fn default_config_has_no_warnings() {
        assert!(Config::default().validate().is_empty());
    }

    #[test]
    fn validate_flags_bad_values() {
        let mut cfg = Config::default();
        cfg.commit.auto_execute_confidence = 1.5;
        cfg.commit.auto_execute_max_tier = RiskTier::Critical;
        cfg.trial.regress_tolerance = -1.0;
        cfg.trial.tick_interval_secs = 0;
        cfg.metrics = MetricsConfig::Http {
            base_url: "localhost".to_string(),
            timeout_secs: 5,
        };

        let warnings = cfg.validate();
        let errors = warnings
            .iter()
            .filter(|w| w.level == WarnLevel::Error)
            .count();
        assert_eq!(errors, 4, "{warnings:?}");
        assert!(warnings
            .iter()
            .any(|w| w.message.contains("auto_execute_max_tier")));
    }

    #[test]
    fn validate_bounds_retry_delay() {
        let mut cfg = Config::default();
        cfg.trial.retry_max_secs = MAX_RETRY_SECS;
        assert!(cfg.validate().is_empty());
        cfg.trial.retry_max_secs = u64::MAX;
        assert!(cfg
            .validate()
            .iter()
            .any(|w| w.level == WarnLevel::Error && w.message.contains("retry_max_secs")));
    }

    #[test]
    fn load_checked_refuses_errors_and_accepts_warnings() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(paths::canary_dir(dir.path())).unwrap();
        std::fs::write(
            paths::config_path(dir.path()),
            "version: 1\ntrial:\n  regress_tolerance: -5.0\n",
        )
        .unwrap();
        assert!(Config::load(dir.path()).is_ok());
        let err = Config::load_checked(dir.path()).unwrap_err();
        assert!(matches!(err, CanaryError::Validation(ref m) if m.contains("regress_tolerance")));
        let err = Config::load_or_default(dir.path()).unwrap_err();
        assert!(matches!(err, CanaryError::Validation(_)));

        std::fs::write(
            paths::config_path(dir.path()),
            "version: 1\ncommit:\n  auto_execute_confidence: 1.5\n",
        )
        .unwrap();
        assert!(Config::load_checked(dir.path()).is_err());

        std::fs::write(
            paths::config_path(dir.path()),
            "version: 1\ntrial:\n  retry_base_secs: 7200\n",
        )
        .unwrap();
        let cfg = Config::load_checked(dir.path()).unwrap();
        assert_eq!(cfg.trial.retry_base_secs, 7200);
    }
}
