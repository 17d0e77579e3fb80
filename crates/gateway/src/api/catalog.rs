//! Read-only catalog endpoints (§6.3): personas, templates, and the combined
//! agent roster, plus the filesystem-backed session index. None of these
//! touch a live `SessionHandle` -- they read the persona store loaded at
//! startup and scan `sessions.state_dir` directly, the same way the
//! persisted-state layout in §6.4 is the only durable record of a session
//! once it has ended.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};

use crate::state::AppState;

pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let running_backend = state.llm.is_running().await;
    let available_models = state.llm.available_models().await.unwrap_or_default();
    Json(serde_json::json!({
        "running_backend": running_backend,
        "available_models": available_models,
        "active_sessions": state.sessions.active_count(),
    }))
}

pub async fn list_agents(State(state): State<AppState>) -> impl IntoResponse {
    let personas: Vec<_> = state.personas.list_personas();
    Json(serde_json::json!({ "agents": personas }))
}

pub async fn list_personas(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "personas": state.personas.list_personas() }))
}

pub async fn get_persona(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.personas.get(&id) {
        Some(p) => Json(serde_json::json!(p)).into_response(),
        None => super::error::ApiError(circle_domain::Error::UnknownPersona(id)).into_response(),
    }
}

pub async fn list_templates(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({ "templates": state.personas.list_templates() }))
}

pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    match state.personas.template(&id) {
        Some(t) => Json(serde_json::json!(t)).into_response(),
        None => super::error::ApiError(circle_domain::Error::UnknownPersona(id)).into_response(),
    }
}

// ── Session index (§6.3 `GET /sessions`, `GET /sessions/<id>/analysis`, ──
// ── `GET /sessions/<id>/dialogue`) ───────────────────────────────────────

/// One entry in the `GET /sessions` listing: a session discovered on disk
/// by scanning `state_dir` for its checkpoint/final/analysis artifacts
/// (§6.4). There is no in-memory index of ended sessions beyond this scan;
/// `SessionRegistry` only tracks sessions live in this process.
fn list_session_ids(state_dir: &std::path::Path) -> Vec<String> {
    let mut ids = std::collections::BTreeSet::new();
    let Ok(entries) = std::fs::read_dir(state_dir) else {
        return Vec::new();
    };
    for entry in entries.filter_map(|e| e.ok()) {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if let Some(rest) = name.strip_prefix("session_") {
            let id = rest
                .strip_suffix("_checkpoint.json")
                .or_else(|| rest.strip_suffix("_analysis.json"))
                .or_else(|| rest.strip_suffix(".json"));
            if let Some(id) = id {
                ids.insert(id.to_string());
            }
        }
    }
    ids.into_iter().collect()
}

pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let state_dir = std::path::Path::new(&state.config.sessions.state_dir);
    let sessions: Vec<_> = list_session_ids(state_dir)
        .into_iter()
        .map(|id| {
            let has_final = state_dir.join(format!("session_{id}.json")).exists();
            let has_checkpoint = state_dir
                .join(format!("session_{id}_checkpoint.json"))
                .exists();
            let has_analysis = state_dir
                .join(format!("session_{id}_analysis.json"))
                .exists();
            serde_json::json!({
                "session_id": id,
                "ended": has_final,
                "has_checkpoint": has_checkpoint,
                "has_analysis": has_analysis,
            })
        })
        .collect();
    Json(serde_json::json!({ "sessions": sessions }))
}

pub async fn get_analysis(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let path = std::path::Path::new(&state.config.sessions.state_dir)
        .join(format!("session_{id}_analysis.json"));
    read_json_artifact(&path, &id).await
}

pub async fn get_dialogue(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let state_dir = std::path::Path::new(&state.config.sessions.state_dir);
    let final_path = state_dir.join(format!("session_{id}.json"));
    let checkpoint_path = state_dir.join(format!("session_{id}_checkpoint.json"));
    let path = if final_path.exists() { final_path } else { checkpoint_path };
    read_json_artifact(&path, &id).await
}

async fn read_json_artifact(path: &std::path::Path, session_id: &str) -> axum::response::Response {
    match std::fs::read(path) {
        Ok(bytes) => match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(value) => Json(value).into_response(),
            Err(e) => super::error::ApiError(circle_domain::Error::from(e)).into_response(),
        },
        Err(_) => {
            super::error::ApiError(circle_domain::Error::UnknownSession(session_id.to_string()))
                .into_response()
        }
    }
}
