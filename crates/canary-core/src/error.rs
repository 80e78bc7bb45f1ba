use thiserror::Error;

#[derive(Debug, Error)]
pub enum CanaryError {
    #[error("not initialized: run 'canary init'")]
    NotInitialized,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("cannot {operation} trial {id}: trial is {state}")]
    InvalidState {
        id: String,
        state: String,
        operation: String,
    },

    #[error("trial not found: {0}")]
    TrialNotFound(String),

    #[error("queued action not found: {0}")]
    ActionNotFound(String),

    #[error("metric '{metric}' unavailable: {reason}")]
    MetricUnavailable { metric: String, reason: String },

    #[error("store error: {0}")]
    Store(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CanaryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn metric(metric: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MetricUnavailable {
            metric: metric.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CanaryError>;
