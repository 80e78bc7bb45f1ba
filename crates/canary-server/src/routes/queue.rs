use axum::extract::{Path, State};
use axum::Json;
use canary_core::commit::CommitDecision;
use canary_core::queue::QueuedAction;
use canary_core::types::CommitState;
use serde::Deserialize;

use super::parse_id;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/queue: every queued action in enqueue order.
pub async fn list(State(app): State<AppState>) -> Json<Vec<QueuedAction>> {
    Json(app.queue().list())
}

/// POST /api/queue: enqueue a decision.
pub async fn enqueue(
    State(app): State<AppState>,
    Json(decision): Json<CommitDecision>,
) -> Result<Json<QueuedAction>, AppError> {
    if !decision.is_consistent() {
        return Err(AppError::bad_request(format!(
            "decision for '{}' has flags that do not match state {}",
            decision.task_id, decision.state
        )));
    }
    Ok(Json(app.queue().enqueue(decision)))
}

/// GET /api/queue/ready
pub async fn ready(State(app): State<AppState>) -> Json<Vec<QueuedAction>> {
    Json(app.queue().ready_actions())
}

/// GET /api/queue/waiting
pub async fn waiting(State(app): State<AppState>) -> Json<Vec<QueuedAction>> {
    Json(app.queue().waiting_actions())
}

/// GET /api/queue/blocked
pub async fn blocked(State(app): State<AppState>) -> Json<Vec<QueuedAction>> {
    Json(app.queue().blocked_actions())
}

/// POST /api/queue/take-ready: remove and return every ready action.
pub async fn take_ready(State(app): State<AppState>) -> Json<Vec<QueuedAction>> {
    Json(app.queue().take_ready())
}

#[derive(Deserialize)]
pub struct StateBody {
    pub state: CommitState,
}

/// POST /api/queue/:id/state: move a queued action to a new state.
pub async fn update_state(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<StateBody>,
) -> Result<Json<QueuedAction>, AppError> {
    let id = parse_id(&id)?;
    let mut queue = app.queue();
    if !queue.update_state(id, body.state)? {
        return Err(AppError::not_found(format!("queued action {id} not found")));
    }
    queue
        .get(id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("queued action {id} not found")))
}

#[derive(Deserialize)]
pub struct CountdownBody {
    pub seconds: u64,
}

/// POST /api/queue/:id/countdown: restart a ready action's countdown.
pub async fn reschedule(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CountdownBody>,
) -> Result<Json<QueuedAction>, AppError> {
    let id = parse_id(&id)?;
    let mut queue = app.queue();
    if !queue.reschedule(id, body.seconds, &app.controller)? {
        return Err(AppError::not_found(format!("queued action {id} not found")));
    }
    queue
        .get(id)
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("queued action {id} not found")))
}

#[derive(Deserialize)]
pub struct ConfirmBody {
    pub confirmed: bool,
}

/// POST /api/queue/:id/confirm: operator answer for a waiting action.
pub async fn confirm(
    State(app): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ConfirmBody>,
) -> Result<Json<QueuedAction>, AppError> {
    let id = parse_id(&id)?;
    app.queue()
        .confirm(id, body.confirmed, &app.controller)?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("queued action {id} not found")))
}

/// DELETE /api/queue/:id: remove an action, returning it.
pub async fn dequeue(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QueuedAction>, AppError> {
    let id = parse_id(&id)?;
    app.queue()
        .dequeue(id)
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("queued action {id} not found")))
}
