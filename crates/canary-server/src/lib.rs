pub mod error;
pub mod routes;
pub mod scheduler;
pub mod state;

use std::path::PathBuf;
use std::time::Duration;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and by the integration tests.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Commit controller
        .route("/api/commit/decide", post(routes::commit::decide))
        .route("/api/commit/confirm", post(routes::commit::confirm))
        .route("/api/commit/countdown", post(routes::commit::countdown))
        // Pending action queue
        .route(
            "/api/queue",
            get(routes::queue::list).post(routes::queue::enqueue),
        )
        .route("/api/queue/ready", get(routes::queue::ready))
        .route("/api/queue/waiting", get(routes::queue::waiting))
        .route("/api/queue/blocked", get(routes::queue::blocked))
        .route("/api/queue/take-ready", post(routes::queue::take_ready))
        .route("/api/queue/{id}", delete(routes::queue::dequeue))
        .route("/api/queue/{id}/state", post(routes::queue::update_state))
        .route("/api/queue/{id}/countdown", post(routes::queue::reschedule))
        .route("/api/queue/{id}/confirm", post(routes::queue::confirm))
        // Trials
        .route(
            "/api/trials",
            get(routes::trials::list).post(routes::trials::create),
        )
        .route("/api/trials/inbox", get(routes::trials::inbox))
        .route("/api/trials/check-now", post(routes::trials::check_now))
        .route("/api/trials/{id}", get(routes::trials::detail))
        .route("/api/trials/{id}/revert", post(routes::trials::revert))
        .route("/api/trials/{id}/note", post(routes::trials::note))
        .route("/api/trials/{id}/followup", post(routes::trials::followup))
        // Scores
        .route("/api/scores", get(routes::scores::list))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Open the project at `root` and serve the API until the process exits.
pub async fn serve(root: PathBuf, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    serve_on(root, listener).await
}

/// Like `serve`, on a pre-bound listener so the caller can pick port 0 and
/// read the actual port back.
pub async fn serve_on(root: PathBuf, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let actual_port = listener.local_addr()?.port();
    let app_state = tokio::task::spawn_blocking(move || AppState::open(root)).await??;

    let every = Duration::from_secs(app_state.config.trial.tick_interval_secs.max(1));
    let ticker = scheduler::spawn(app_state.trials.clone(), every);

    tracing::info!("canary server listening on http://localhost:{actual_port}");
    let result = axum::serve(listener, build_router(app_state)).await;
    ticker.abort();
    result?;
    Ok(())
}
