use axum::extract::State;
use axum::Json;
use canary_core::commit::CommitDecision;
use canary_core::queue::QueuedAction;
use canary_core::types::{Decision, RiskAssessment, Task};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct DecideBody {
    pub task: Task,
    pub risk: RiskAssessment,
    pub decision: Decision,
    /// Also place the decision on the pending action queue.
    #[serde(default)]
    pub enqueue: bool,
}

#[derive(Serialize)]
pub struct DecideResponse {
    pub decision: CommitDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queued: Option<QueuedAction>,
}

/// POST /api/commit/decide: classify a task into a commit state.
pub async fn decide(
    State(app): State<AppState>,
    Json(body): Json<DecideBody>,
) -> Result<Json<DecideResponse>, AppError> {
    let decision = app
        .controller
        .determine_commit(&body.task, &body.risk, &body.decision);
    let queued = body.enqueue.then(|| app.queue().enqueue(decision.clone()));
    Ok(Json(DecideResponse { decision, queued }))
}

#[derive(Deserialize)]
pub struct ConfirmBody {
    pub decision: CommitDecision,
    pub confirmed: bool,
}

/// POST /api/commit/confirm: apply an operator answer to a decision.
pub async fn confirm(
    State(app): State<AppState>,
    Json(body): Json<ConfirmBody>,
) -> Result<Json<CommitDecision>, AppError> {
    let decision = app
        .controller
        .process_confirmation(&body.decision, body.confirmed)?;
    Ok(Json(decision))
}

#[derive(Deserialize)]
pub struct CountdownBody {
    pub decision: CommitDecision,
    pub seconds: u64,
}

/// POST /api/commit/countdown: change the countdown on a ready decision.
pub async fn countdown(
    State(app): State<AppState>,
    Json(body): Json<CountdownBody>,
) -> Result<Json<CommitDecision>, AppError> {
    let decision = app
        .controller
        .update_countdown(&body.decision, body.seconds)?;
    Ok(Json(decision))
}
