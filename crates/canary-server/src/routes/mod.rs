pub mod commit;
pub mod queue;
pub mod scores;
pub mod trials;

use uuid::Uuid;

use crate::error::AppError;

/// Parse a path id, answering 400 with a JSON body instead of axum's plain
/// text rejection.
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw.trim()).map_err(|_| AppError::bad_request(format!("invalid id '{raw}'")))
}
