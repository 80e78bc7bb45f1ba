use std::path::PathBuf;
use std::sync::Arc;

use axum::http::StatusCode;
use canary_core::clock::{Clock, ManualClock};
use canary_core::config::Config;
use canary_core::metric::StaticMetrics;
use canary_core::trial::{TrialDb, TrialEngine};
use canary_server::state::AppState;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::json;
use tempfile::TempDir;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

struct Harness {
    app: axum::Router,
    metrics: Arc<StaticMetrics>,
    clock: Arc<ManualClock>,
}

impl Harness {
    fn new() -> Self {
        let metrics = Arc::new(StaticMetrics::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let config = Config::default();
        let engine = TrialEngine::in_memory(metrics.clone(), clock.clone(), config.trial.clone());
        let state = AppState::from_parts(PathBuf::from("."), config, engine, clock.clone());
        Self {
            app: canary_server::build_router(state),
            metrics,
            clock,
        }
    }

    fn app(&self) -> axum::Router {
        self.app.clone()
    }
}

async fn send(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };
    let response = app.oneshot(req).await.unwrap();
    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
    (status, json)
}

async fn get(app: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    send(app, "GET", uri, None).await
}

async fn post_json(
    app: axum::Router,
    uri: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send(app, "POST", uri, Some(body)).await
}

fn decide_body(task_tier: &str, risk_tier: &str, confidence: f64, enqueue: bool) -> serde_json::Value {
    json!({
        "task": { "id": "rotate-logs", "risk_tier": task_tier },
        "risk": { "tier": risk_tier, "reasons": ["touches disk"] },
        "decision": { "confidence": confidence },
        "enqueue": enqueue,
    })
}

fn latency_trial() -> serde_json::Value {
    json!({
        "action": "raise cache ttl to 300s",
        "context": "api",
        "metric_name": "p99_ms",
        "direction": "lower_is_better",
        "check_after_sec": 60,
        "tags": ["cache"],
    })
}

// ---------------------------------------------------------------------------
// Commit controller
// ---------------------------------------------------------------------------

#[tokio::test]
async fn decide_low_risk_is_action_ready() {
    let h = Harness::new();
    let (status, body) = post_json(h.app(), "/api/commit/decide", decide_body("low", "low", 0.95, false)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"]["state"], "action_ready");
    assert_eq!(body["decision"]["auto_execute"], true);
    assert_eq!(body["decision"]["countdown_seconds"], 10);
    assert!(body.get("queued").is_none());
}

#[tokio::test]
async fn decide_critical_is_blocked_and_can_be_queued() {
    let h = Harness::new();
    let (status, body) = post_json(
        h.app(),
        "/api/commit/decide",
        decide_body("low", "critical", 0.99, true),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["decision"]["state"], "blocked");
    assert_eq!(body["decision"]["auto_execute"], false);
    assert_eq!(body["queued"]["state"], "blocked");

    let (_, blocked) = get(h.app(), "/api/queue/blocked").await;
    assert_eq!(blocked.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn confirm_and_countdown_on_bare_decisions() {
    let h = Harness::new();
    let (_, body) = post_json(h.app(), "/api/commit/decide", decide_body("low", "low", 0.3, false)).await;
    let waiting = body["decision"].clone();
    assert_eq!(waiting["state"], "needs_confirm");

    let (status, confirmed) = post_json(
        h.app(),
        "/api/commit/confirm",
        json!({ "decision": waiting, "confirmed": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["state"], "action_ready");

    let (status, shorter) = post_json(
        h.app(),
        "/api/commit/countdown",
        json!({ "decision": confirmed, "seconds": 3 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shorter["countdown_seconds"], 3);

    // Countdown on a decision still waiting for an operator is a conflict.
    let (status, body) = post_json(
        h.app(),
        "/api/commit/countdown",
        json!({ "decision": waiting, "seconds": 3 }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queued_action_becomes_ready_after_countdown() {
    let h = Harness::new();
    let (_, body) = post_json(h.app(), "/api/commit/decide", decide_body("low", "low", 0.9, true)).await;
    let id = body["queued"]["id"].as_str().unwrap().to_string();

    let (_, ready) = get(h.app(), "/api/queue/ready").await;
    assert!(ready.as_array().unwrap().is_empty());
    let (_, waiting) = get(h.app(), "/api/queue/waiting").await;
    assert_eq!(waiting.as_array().unwrap().len(), 1);

    h.clock.advance_secs(10);
    let (_, taken) = post_json(h.app(), "/api/queue/take-ready", json!({})).await;
    assert_eq!(taken.as_array().unwrap().len(), 1);
    assert_eq!(taken[0]["id"], id.as_str());

    let (_, all) = get(h.app(), "/api/queue").await;
    assert!(all.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn queue_confirm_then_reschedule() {
    let h = Harness::new();
    let (_, body) = post_json(h.app(), "/api/commit/decide", decide_body("high", "low", 0.9, true)).await;
    assert_eq!(body["queued"]["state"], "needs_confirm");
    let id = body["queued"]["id"].as_str().unwrap().to_string();

    let (status, confirmed) = post_json(
        h.app(),
        &format!("/api/queue/{id}/confirm"),
        json!({ "confirmed": true }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(confirmed["state"], "action_ready");

    let (status, rescheduled) = post_json(
        h.app(),
        &format!("/api/queue/{id}/countdown"),
        json!({ "seconds": 0 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rescheduled["decision"]["countdown_seconds"], 0);

    let (_, ready) = get(h.app(), "/api/queue/ready").await;
    assert_eq!(ready.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn queue_state_transitions_are_checked() {
    let h = Harness::new();
    let (_, body) = post_json(h.app(), "/api/commit/decide", decide_body("low", "low", 0.9, true)).await;
    let id = body["queued"]["id"].as_str().unwrap().to_string();

    let (status, executed) = post_json(
        h.app(),
        &format!("/api/queue/{id}/state"),
        json!({ "state": "executed" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(executed["state"], "executed");

    let (status, _) = post_json(
        h.app(),
        &format!("/api/queue/{id}/state"),
        json!({ "state": "action_ready" }),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn dequeue_unknown_and_malformed_ids() {
    let h = Harness::new();
    let missing = uuid::Uuid::new_v4();
    let (status, body) = send(h.app(), "DELETE", &format!("/api/queue/{missing}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));

    let (status, _) = send(h.app(), "DELETE", "/api/queue/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = post_json(h.app(), "/api/commit/decide", decide_body("low", "low", 0.9, true)).await;
    let id = body["queued"]["id"].as_str().unwrap().to_string();
    let (status, removed) = send(h.app(), "DELETE", &format!("/api/queue/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(removed["id"], id.as_str());
}

#[tokio::test]
async fn enqueue_rejects_inconsistent_decision() {
    let h = Harness::new();
    let (status, _) = post_json(
        h.app(),
        "/api/queue",
        json!({
            "task_id": "t",
            "state": "blocked",
            "auto_execute": true,
            "requires_confirmation": false,
            "justification": "forged",
        }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Trials
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trial_flow_through_inbox() {
    let h = Harness::new();
    h.metrics.set("p99_ms", 200.0);

    let (status, trial) = post_json(h.app(), "/api/trials", latency_trial()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(trial["metric_before"], 200.0);
    let id = trial["id"].as_str().unwrap().to_string();

    let (_, inbox) = get(h.app(), "/api/trials/inbox?tab=pending").await;
    assert_eq!(inbox["items"].as_array().unwrap().len(), 1);
    assert_eq!(inbox["items"][0]["due"], false);

    h.metrics.set("p99_ms", 260.0);
    h.clock.advance_secs(60);
    let (status, report) = post_json(h.app(), "/api/trials/check-now", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["resolved"].as_array().unwrap().len(), 1);
    assert_eq!(report["resolved"][0]["survived"], false);

    let (_, review) = get(h.app(), "/api/trials/inbox?tab=needs_review").await;
    assert_eq!(review["items"][0]["id"], id.as_str());

    let (status, _) = post_json(h.app(), &format!("/api/trials/{id}/revert"), json!({})).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = post_json(h.app(), &format!("/api/trials/{id}/revert"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("reverted"));

    let (_, done) = get(h.app(), "/api/trials/inbox?tab=completed&limit=5").await;
    assert_eq!(done["counts"]["completed"], 1);
    assert_eq!(done["counts"]["needs_review"], 0);

    let (_, detail) = get(h.app(), &format!("/api/trials/{id}")).await;
    let events: Vec<&str> = detail["audit"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event"].as_str().unwrap())
        .collect();
    assert_eq!(events, vec!["created", "resolved", "reverted"]);
}

#[tokio::test]
async fn trial_note_and_followup() {
    let h = Harness::new();
    h.metrics.set("p99_ms", 200.0);
    let (_, trial) = post_json(h.app(), "/api/trials", latency_trial()).await;
    let id = trial["id"].as_str().unwrap().to_string();

    let (status, _) = post_json(h.app(), &format!("/api/trials/{id}/followup"), json!({})).await;
    assert_eq!(status, StatusCode::CONFLICT, "pending trials cannot be followed up");

    let (status, _) = post_json(h.app(), &format!("/api/trials/{id}/note"), json!({ "text": "  " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    h.metrics.set("p99_ms", 150.0);
    h.clock.advance_secs(60);
    post_json(h.app(), "/api/trials/check-now", json!({})).await;

    let (status, noted) = post_json(
        h.app(),
        &format!("/api/trials/{id}/note"),
        json!({ "text": "kept after review" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(noted["noted_after_verdict"], true);

    let (status, child) = post_json(
        h.app(),
        &format!("/api/trials/{id}/followup"),
        json!({ "check_after_sec": 120 }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(child["parent_id"], id.as_str());
    assert_eq!(child["metric_before"], 150.0);
    assert_eq!(child["check_after_sec"], 120);
}

#[tokio::test]
async fn trial_errors_map_to_statuses() {
    let h = Harness::new();

    let mut body = latency_trial();
    body["check_after_sec"] = json!(0);
    let (status, _) = post_json(h.app(), "/api/trials", body).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = post_json(h.app(), "/api/trials", latency_trial()).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("p99_ms"));

    let missing = uuid::Uuid::new_v4();
    let (status, _) = get(h.app(), &format!("/api/trials/{missing}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(h.app(), "/api/trials/inbox?tab=archived").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Scores
// ---------------------------------------------------------------------------

#[tokio::test]
async fn scores_aggregate_resolved_trials() {
    let h = Harness::new();
    for after in [150.0, 160.0, 170.0, 260.0] {
        h.metrics.set("p99_ms", 200.0);
        post_json(h.app(), "/api/trials", latency_trial()).await;
        h.metrics.set("p99_ms", after);
        h.clock.advance_secs(60);
        post_json(h.app(), "/api/trials/check-now", json!({})).await;
    }

    let (status, scores) = get(h.app(), "/api/scores?limit=10").await;
    assert_eq!(status, StatusCode::OK);
    let scores = scores.as_array().unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0]["action_template"], "raise cache ttl to {n}s");
    assert_eq!(scores[0]["tag"], "cache");
    assert_eq!(scores[0]["survival_rate"], 0.75);

    let (_, filtered) = get(h.app(), "/api/scores?tag=other").await;
    assert!(filtered.as_array().unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn trials_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let db_path = canary_core::paths::db_path(dir.path());
    let metrics = Arc::new(StaticMetrics::new());
    metrics.set("p99_ms", 200.0);
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(Utc::now()));

    let build = |metrics: Arc<StaticMetrics>| {
        let db_path = db_path.clone();
        let clock = clock.clone();
        let root = dir.path().to_path_buf();
        async move {
            tokio::task::spawn_blocking(move || {
                let engine = TrialEngine::open(
                    Box::new(TrialDb::open(&db_path).unwrap()),
                    metrics,
                    clock.clone(),
                    Config::default().trial,
                )
                .unwrap();
                canary_server::build_router(AppState::from_parts(
                    root,
                    Config::default(),
                    engine,
                    clock,
                ))
            })
            .await
            .unwrap()
        }
    };

    let id = {
        let app = build(metrics.clone()).await;
        let (_, trial) = post_json(app, "/api/trials", latency_trial()).await;
        trial["id"].as_str().unwrap().to_string()
    };

    let app = build(metrics).await;
    let (status, detail) = get(app, &format!("/api/trials/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["trial"]["metric_before"], 200.0);
    assert_eq!(detail["audit"].as_array().unwrap().len(), 1);
}
