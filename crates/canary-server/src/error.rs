use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use canary_core::error::CanaryError;

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 404 errors
// ---------------------------------------------------------------------------

/// Carries a 404 through the `anyhow::Error` chain for lookups that return
/// `Option` rather than a `CanaryError`.
#[derive(Debug)]
struct NotFoundError(String);

impl std::fmt::Display for NotFoundError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotFoundError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// 400 Bad Request.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(CanaryError::Validation(msg.into()).into())
    }

    /// 404 Not Found.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self(NotFoundError(msg.into()).into())
    }

    pub fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<NotFoundError>().is_some() {
            return StatusCode::NOT_FOUND;
        }
        match self.0.downcast_ref::<CanaryError>() {
            Some(e) => match e {
                CanaryError::NotInitialized | CanaryError::Validation(_) => {
                    StatusCode::BAD_REQUEST
                }
                CanaryError::TrialNotFound(_) | CanaryError::ActionNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                CanaryError::InvalidTransition { .. } | CanaryError::InvalidState { .. } => {
                    StatusCode::CONFLICT
                }
                CanaryError::MetricUnavailable { .. } => StatusCode::BAD_GATEWAY,
                CanaryError::Store(_)
                | CanaryError::Io(_)
                | CanaryError::Yaml(_)
                | CanaryError::Json(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            None => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
