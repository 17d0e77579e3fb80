pub mod auth;
pub mod catalog;
pub mod error;
pub mod session;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

/// Build the full API router, nested under `/v1` (§6.3).
///
/// Routes are split into **public** (no auth required) and **protected**
/// (gated behind the bearer-token middleware named by
/// `config.server.api_token_env`). `/v1/health` is always public.
///
/// `state` is needed to wire up the auth middleware at build time.
pub fn router(state: AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/health", get(health))
        .route("/status", get(catalog::status));

    let protected = Router::new()
        .route("/agents", get(catalog::list_agents))
        .route("/personas", get(catalog::list_personas))
        .route("/personas/:id", get(catalog::get_persona))
        .route("/templates", get(catalog::list_templates))
        .route("/templates/:id", get(catalog::get_template))
        .route("/session/start", post(session::start_session))
        .route("/session/:id/state", get(session::get_session_state))
        .route("/session/:id/stream", get(session::stream_session))
        .route("/session/:id/pause", post(session::pause))
        .route("/session/:id/resume", post(session::resume))
        .route("/session/:id/human", post(session::submit_human))
        .route("/session/:id/invoke", post(session::invoke))
        .route("/session/:id/inject", post(session::inject))
        .route("/session/:id/continue", post(session::continue_session))
        .route("/session/:id/end", post(session::end_session))
        .route("/sessions", get(catalog::list_sessions))
        .route("/sessions/:id/analysis", get(catalog::get_analysis))
        .route("/sessions/:id/dialogue", get(catalog::get_dialogue))
        .route_layer(middleware::from_fn_with_state(
            state,
            auth::require_api_token,
        ));

    let v1 = public.merge(protected);

    Router::new()
        .nest("/v1", v1)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
