use axum::extract::{Query, State};
use axum::Json;
use canary_core::score::SurvivalScore;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Deserialize)]
pub struct ScoresQuery {
    pub limit: Option<usize>,
    /// Only scores for this tag.
    pub tag: Option<String>,
}

/// GET /api/scores: survival rate per action template and tag.
pub async fn list(
    State(app): State<AppState>,
    Query(query): Query<ScoresQuery>,
) -> Json<Vec<SurvivalScore>> {
    let limit = query.limit.unwrap_or(app.config.trial.default_limit);
    let snapshot = app.trials.snapshot();
    let mut scores = app.scores.scores(&snapshot, usize::MAX);
    if let Some(tag) = query.tag.as_deref() {
        scores.retain(|s| s.tag.as_deref() == Some(tag));
    }
    scores.truncate(limit);
    Json(scores)
}
