use axum::extract::{Path, Query, State};
use axum::Json;
use canary_core::trial::{CheckReport, Inbox, InboxTab, NewTrial, Trial, TrialDetail};
use serde::Deserialize;

use super::parse_id;
use crate::error::AppError;
use crate::state::AppState;

/// Run a blocking engine call off the async workers.
async fn blocking<T, F>(f: F) -> Result<T, AppError>
where
    F: FnOnce() -> canary_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError(anyhow::anyhow!("trial task join error: {e}")))??;
    Ok(result)
}

/// POST /api/trials: start a trial; reads the baseline metric.
pub async fn create(
    State(app): State<AppState>,
    Json(body): Json<NewTrial>,
) -> Result<Json<Trial>, AppError> {
    let engine = app.trials.clone();
    Ok(Json(blocking(move || engine.create(body)).await?))
}

/// GET /api/trials: every trial in creation order.
pub async fn list(State(app): State<AppState>) -> Json<Vec<Trial>> {
    Json(app.trials.list())
}

#[derive(Deserialize)]
pub struct InboxQuery {
    pub tab: Option<String>,
    pub limit: Option<usize>,
}

/// GET /api/trials/inbox?tab=&limit=
pub async fn inbox(
    State(app): State<AppState>,
    Query(query): Query<InboxQuery>,
) -> Result<Json<Inbox>, AppError> {
    let tab = match query.tab.as_deref() {
        Some(raw) => raw.parse::<InboxTab>()?,
        None => InboxTab::default(),
    };
    let limit = query.limit.unwrap_or(app.config.trial.default_limit);
    Ok(Json(app.trials.inbox(tab, limit)))
}

/// GET /api/trials/:id: trial plus its audit trail.
pub async fn detail(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TrialDetail>, AppError> {
    let id = parse_id(&id)?;
    Ok(Json(app.trials.detail(id)?))
}

/// POST /api/trials/:id/revert
pub async fn revert(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Trial>, AppError> {
    let id = parse_id(&id)?;
    let engine = app.trials.clone();
    Ok(Json(blocking(move || engine.revert(id)).await?))
}

#[derive(Deserialize)]
pub struct NoteBody {
    pub text: String,
}

/// POST /api/trials/:id/note
pub async fn note(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<NoteBody>,
) -> Result<Json<Trial>, AppError> {
    let id = parse_id(&id)?;
    let engine = app.trials.clone();
    Ok(Json(blocking(move || engine.note(id, &body.text)).await?))
}

#[derive(Deserialize, Default)]
pub struct FollowupBody {
    #[serde(default)]
    pub check_after_sec: Option<i64>,
}

/// POST /api/trials/:id/followup: re-run a resolved trial's change check.
pub async fn followup(
    State(app): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<FollowupBody>>,
) -> Result<Json<Trial>, AppError> {
    let id = parse_id(&id)?;
    let Json(body) = body.unwrap_or_default();
    let engine = app.trials.clone();
    Ok(Json(
        blocking(move || engine.followup(id, body.check_after_sec)).await?,
    ))
}

/// POST /api/trials/check-now: resolve due trials immediately.
pub async fn check_now(State(app): State<AppState>) -> Result<Json<CheckReport>, AppError> {
    let engine = app.trials.clone();
    Ok(Json(blocking(move || engine.check_due()).await?))
}
