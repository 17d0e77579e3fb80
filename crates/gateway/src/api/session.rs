//! Session lifecycle and control endpoints (§6.3, §4.4): starting a
//! session, reading its snapshot, streaming its Event Bus over SSE, and the
//! operator actions (`pause`, `resume`, `human`, `invoke`, `inject`,
//! `continue`, `end`). Every control verb here is a thin translation layer
//! over `SessionHandle` -- none of them touch the log or history directly
//! (§5 single-writer), matching the teacher's run-inspection handlers in
//! shape if not in domain.

use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Json, Response};
use futures_util::stream::Stream;
use serde::Deserialize;
use uuid::Uuid;

use circle_domain::model::{AgentBinding, EnsembleConfig, EnsembleMode, Event, SessionRecord};
use circle_domain::Error;

use crate::runtime::generation_loop::{self, SpawnParams};
use crate::runtime::scheduler::HUMAN_SLOT;
use crate::state::AppState;

use super::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub provocation: String,
    #[serde(default)]
    pub personas: Option<Vec<String>>,
    #[serde(default)]
    pub include_human: Option<bool>,
    #[serde(default)]
    pub seed: Option<i64>,
    #[serde(default)]
    pub config: Option<EnsembleConfig>,
    /// Resume this session id from its last checkpoint instead of starting
    /// fresh (§4.6). `provocation`/`personas` are ignored in favor of what
    /// the checkpoint already recorded; `config.dialogue` still applies,
    /// since `max_turns`/`cooldown`/`context_window` aren't persisted.
    #[serde(default)]
    pub resume_session_id: Option<String>,
}

fn mode_label(mode: EnsembleMode) -> &'static str {
    match mode {
        EnsembleMode::SingleModel => "single_model",
        EnsembleMode::MultiModel => "multi_model",
    }
}

/// Resolves the submitted `config` (or a bare `personas` list) into the
/// agent roster and per-agent model/temperature bindings a session needs
/// at spawn time (§6.5). An agent with no resolvable model is a
/// configuration error, not a transient one (§7).
fn resolve_bindings(
    state: &AppState,
    config: &EnsembleConfig,
    personas: Option<&[String]>,
) -> Result<(Vec<String>, HashMap<String, AgentBinding>), Error> {
    let roster: Vec<String> = if !config.agents.is_empty() {
        config.agents.keys().cloned().collect()
    } else if let Some(p) = personas {
        p.to_vec()
    } else {
        state
            .personas
            .list_personas()
            .iter()
            .map(|p| p.id.clone())
            .collect()
    };

    if roster.is_empty() {
        return Err(Error::Config("no agents resolved for this session".to_string()));
    }

    let mut bindings = HashMap::with_capacity(roster.len());
    for agent_id in &roster {
        if state.personas.get(agent_id).is_none() {
            return Err(Error::UnknownPersona(agent_id.clone()));
        }
        let spec = config.agents.get(agent_id);
        let model_id = match spec {
            Some(spec) => spec.model().to_string(),
            None => match (config.mode, &config.shared_model) {
                (EnsembleMode::SingleModel, Some(m)) => m.clone(),
                _ => {
                    return Err(Error::Config(format!(
                        "agent '{agent_id}' has no model bound and no shared_model is set"
                    )))
                }
            },
        };
        let base_temperature = spec.and_then(|s| s.temperature()).unwrap_or(0.7);
        bindings.insert(
            agent_id.clone(),
            AgentBinding { persona_id: agent_id.clone(), model_id, base_temperature },
        );
    }

    Ok((roster, bindings))
}

pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Response {
    if let Some(session_id) = req.resume_session_id.clone() {
        return resume_existing_session(state, req, session_id).await;
    }

    let config = req.config.unwrap_or(EnsembleConfig {
        mode: EnsembleMode::MultiModel,
        shared_model: None,
        agents: HashMap::new(),
        dialogue: Default::default(),
        personality_enabled: false,
        embedding_storage_mode: Default::default(),
        include_human: req.include_human.unwrap_or(false),
    });

    let (roster, bindings) =
        match resolve_bindings(&state, &config, req.personas.as_deref()) {
            Ok(v) => v,
            Err(e) => return ApiError(e).into_response(),
        };

    let include_human = req.include_human.unwrap_or(config.include_human);
    let human_handle = include_human.then(|| HUMAN_SLOT.to_string());
    let session_id = Uuid::new_v4().to_string();
    let seed = req.seed.unwrap_or_else(|| rand::random::<i64>());

    let params = SpawnParams {
        session_id: session_id.clone(),
        mode: mode_label(config.mode).to_string(),
        provocation_id: None,
        provocation_text: req.provocation,
        seed,
        config_path: None,
        state_dir: PathBuf::from(&state.config.sessions.state_dir),
        embedding_storage_mode: config.embedding_storage_mode,
        dialogue: config.dialogue,
        include_human,
        human_handle,
        bindings: bindings.clone(),
        roster: roster.clone(),
        personality_enabled: config.personality_enabled,
        event_bus_capacity: state.config.sessions.event_bus_capacity,
        turn_retries: state.config.llm.turn_retries,
        resume_checkpoint: None,
    };

    let handle = match generation_loop::spawn(
        params,
        state.personas.clone(),
        state.llm.clone(),
        state.embeddings.clone(),
        state.warmth.clone(),
    ) {
        Ok(h) => h,
        Err(e) => return ApiError(e).into_response(),
    };
    state.sessions.insert(handle);

    Json(serde_json::json!({ "session_id": session_id, "agents": roster })).into_response()
}

/// §4.6 resume entry point: reloads the named session's last checkpoint and
/// re-spawns its generation loop from there. The roster and per-agent model
/// bindings come from the checkpoint's own `model_assignments`/
/// `temperature_assignments`, not from the request, so a resumed session
/// can't drift from what it actually ran with; `config.dialogue` still has
/// to come from the request since turn limits and context window aren't
/// part of the persisted record.
async fn resume_existing_session(
    state: AppState,
    req: StartSessionRequest,
    session_id: String,
) -> Response {
    let state_dir = PathBuf::from(&state.config.sessions.state_dir);
    let checkpoint_path = state_dir.join(format!("session_{session_id}_checkpoint.json"));
    if !checkpoint_path.exists() {
        return ApiError(Error::UnknownSession(session_id)).into_response();
    }

    let raw = match std::fs::read_to_string(&checkpoint_path) {
        Ok(raw) => raw,
        Err(e) => return ApiError(Error::Io(e)).into_response(),
    };
    let stored: SessionRecord = match serde_json::from_str(&raw) {
        Ok(v) => v,
        Err(e) => return ApiError(Error::Json(e)).into_response(),
    };

    let roster: Vec<String> = stored.model_assignments.keys().cloned().collect();
    if roster.is_empty() {
        return ApiError(Error::Config(
            "resumed session has no recorded agent bindings".to_string(),
        ))
        .into_response();
    }
    for agent_id in &roster {
        if state.personas.get(agent_id).is_none() {
            return ApiError(Error::UnknownPersona(agent_id.clone())).into_response();
        }
    }
    let mut bindings = HashMap::with_capacity(roster.len());
    for agent_id in &roster {
        let model_id = stored.model_assignments.get(agent_id).cloned().unwrap_or_default();
        let base_temperature =
            stored.temperature_assignments.get(agent_id).copied().unwrap_or(0.7);
        bindings.insert(
            agent_id.clone(),
            AgentBinding { persona_id: agent_id.clone(), model_id, base_temperature },
        );
    }

    // `include_human` isn't part of `SessionRecord` (§6.4), so default it
    // from whether a human turn actually appears in the recorded history
    // rather than silently assuming `false` and dropping the human slot
    // from the rebuilt scheduler's roster.
    let history_had_human = stored.turns.iter().any(|t| t.agent_id == HUMAN_SLOT);
    let config = req.config.unwrap_or(EnsembleConfig {
        mode: EnsembleMode::MultiModel,
        shared_model: None,
        agents: HashMap::new(),
        dialogue: Default::default(),
        personality_enabled: false,
        embedding_storage_mode: stored.embedding_storage_mode,
        include_human: history_had_human,
    });
    let include_human = req.include_human.unwrap_or(config.include_human || history_had_human);
    let human_handle = include_human.then(|| HUMAN_SLOT.to_string());

    let params = SpawnParams {
        session_id: session_id.clone(),
        mode: stored.mode.clone(),
        provocation_id: stored.provocation_id.clone(),
        provocation_text: stored.provocation_text.clone(),
        seed: stored.seed,
        config_path: stored.config_path.clone(),
        state_dir: state_dir.clone(),
        embedding_storage_mode: stored.embedding_storage_mode,
        dialogue: config.dialogue,
        include_human,
        human_handle,
        bindings: bindings.clone(),
        roster: roster.clone(),
        personality_enabled: config.personality_enabled,
        event_bus_capacity: state.config.sessions.event_bus_capacity,
        turn_retries: state.config.llm.turn_retries,
        resume_checkpoint: Some(checkpoint_path),
    };

    let handle = match generation_loop::spawn(
        params,
        state.personas.clone(),
        state.llm.clone(),
        state.embeddings.clone(),
        state.warmth.clone(),
    ) {
        Ok(h) => h,
        Err(e) => return ApiError(e).into_response(),
    };
    state.sessions.insert(handle);

    Json(serde_json::json!({ "session_id": session_id, "agents": roster })).into_response()
}

fn state_artifact_path(state: &AppState, session_id: &str) -> (PathBuf, PathBuf) {
    let dir = FsPath::new(&state.config.sessions.state_dir);
    (
        dir.join(format!("session_{session_id}.json")),
        dir.join(format!("session_{session_id}_checkpoint.json")),
    )
}

pub async fn get_session_state(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(handle) = state.sessions.get(&session_id) else {
        return ApiError(Error::UnknownSession(session_id)).into_response();
    };
    let (final_path, checkpoint_path) = state_artifact_path(&state, &session_id);
    let record_path = if final_path.exists() {
        Some(final_path)
    } else if checkpoint_path.exists() {
        Some(checkpoint_path)
    } else {
        None
    };
    let record = record_path
        .and_then(|p| std::fs::read(p).ok())
        .and_then(|bytes| serde_json::from_slice::<serde_json::Value>(&bytes).ok());

    Json(serde_json::json!({
        "session_id": handle.session_id(),
        "state": handle.state(),
        "record": record,
    }))
    .into_response()
}

fn event_type_name(event: &Event) -> &'static str {
    match event {
        Event::Turn(_) => "turn",
        Event::State(_) => "state",
        Event::Metrics(_) => "metrics",
        Event::Error(_) => "error",
    }
}

pub async fn stream_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Response {
    let Some(handle) = state.sessions.get(&session_id) else {
        let stream = futures_util::stream::once(async {
            Ok::<_, std::convert::Infallible>(
                SseEvent::default().event("error").data(r#"{"error":"unknown session"}"#),
            )
        });
        return Sse::new(stream).keep_alive(KeepAlive::default()).into_response();
    };

    let keepalive = KeepAlive::default()
        .interval(Duration::from_secs(state.config.sessions.keepalive_secs));
    let rx = handle.subscribe();
    Sse::new(make_event_stream(rx)).keep_alive(keepalive).into_response()
}

fn make_event_stream(
    mut rx: tokio::sync::broadcast::Receiver<Event>,
) -> impl Stream<Item = Result<SseEvent, std::convert::Infallible>> {
    async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let terminal = matches!(
                        &event,
                        Event::State(p) if p.state.is_terminal()
                    ) || matches!(&event, Event::Error(_));
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    yield Ok(SseEvent::default().event(event_type_name(&event)).data(data));
                    if terminal {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    let msg = format!("{{\"warning\":\"missed {n} events\"}}");
                    yield Ok(SseEvent::default().event("warning").data(msg));
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct HumanSubmission {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct InvokeRequest {
    #[serde(default)]
    pub agent_id: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct InjectRequest {
    #[serde(default)]
    pub text: String,
}

pub async fn pause(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    with_handle(&state, &id, |h| async move {
        h.pause().await;
        Json(serde_json::json!({ "ok": true })).into_response()
    })
    .await
}

pub async fn resume(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    with_handle(&state, &id, |h| async move {
        h.resume().await;
        Json(serde_json::json!({ "ok": true })).into_response()
    })
    .await
}

pub async fn continue_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    with_handle(&state, &id, |h| async move {
        h.continue_().await;
        Json(serde_json::json!({ "ok": true })).into_response()
    })
    .await
}

pub async fn invoke(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<InvokeRequest>,
) -> Response {
    with_handle(&state, &id, |h| async move {
        h.invoke(body.agent_id).await;
        Json(serde_json::json!({ "ok": true })).into_response()
    })
    .await
}

pub async fn inject(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<InjectRequest>,
) -> Response {
    with_handle(&state, &id, |h| async move {
        h.inject(body.text).await;
        Json(serde_json::json!({ "ok": true })).into_response()
    })
    .await
}

pub async fn submit_human(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<HumanSubmission>,
) -> Response {
    let Some(handle) = state.sessions.get(&id) else {
        return ApiError(Error::UnknownSession(id)).into_response();
    };
    if body.text.trim().is_empty() {
        return ApiError(Error::HumanProtocol("human turn text must not be empty".to_string()))
            .into_response();
    }
    match handle.submit_human(body.text).await {
        Ok(turn) => Json(serde_json::json!(turn)).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

pub async fn end_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let Some(handle) = state.sessions.get(&id) else {
        return ApiError(Error::UnknownSession(id)).into_response();
    };
    match handle.end().await {
        Ok(path) => Json(serde_json::json!({ "final_path": path })).into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

async fn with_handle<F, Fut>(state: &AppState, session_id: &str, f: F) -> Response
where
    F: FnOnce(std::sync::Arc<crate::runtime::session::SessionHandle>) -> Fut,
    Fut: std::future::Future<Output = Response>,
{
    match state.sessions.get(session_id) {
        Some(handle) => f(handle).await,
        None => ApiError(Error::UnknownSession(session_id.to_string())).into_response(),
    }
}
