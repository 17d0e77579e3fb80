//! Generation Loop and Session Controller (§4.2): drives one session's
//! turn-by-turn production from `Idle` through `Complete`, the sole writer
//! of that session's log and basin history (§5).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use circle_analysis::{CoherencePattern, StreamingAnalyzer};
use circle_domain::model::{
    AgentBinding, BasinHistory, DialogueConfig, EmbeddingStorageMode, Event, ErrorEventPayload,
    MetricsEventPayload, Persona, SessionState, StateEventPayload, TurnEventPayload, TurnRecord,
};
use circle_domain::trace::TraceEvent;
use circle_domain::Error;
use circle_llm::{ChatMessage, ChatRequest, EmbeddingClient, LlmClient, WarmthManager};
use circle_sessions::{PersonaStore, SessionLog};
use regex::Regex;

use super::context_builder::{build_context, HistoryItem};
use super::scheduler::{TurnScheduler, HUMAN_SLOT};
use super::session::{ControlMessage, SessionHandle};

/// Metrics are recomputed every `METRICS_EVERY` turns (§4.2 step h: "if
/// enabled and `turn_number mod M == 0`"). The spec leaves `M` unpinned;
/// analysis is cheap enough to run every turn (see DESIGN.md).
const METRICS_EVERY: u64 = 1;

/// Trajectory ring-buffer capacity, independent of `max_turns` so a session
/// resumed with a higher cap doesn't need a new analyzer.
const TRAJECTORY_CAPACITY: usize = 256;

/// Bootstrap/permutation counts for the offline summary's confidence
/// intervals (§4.12 defaults).
const BOOTSTRAP_RESAMPLES: usize = 300;
const NULL_PERMUTATIONS: usize = 200;

enum HistoryEntry {
    Turn { speaker_display: String, content: String },
    Interjection { content: String },
}

/// Inputs resolved once at session start from the submitted ensemble
/// config (§6.5) before the loop task is spawned.
pub struct SpawnParams {
    pub session_id: String,
    pub mode: String,
    pub provocation_id: Option<String>,
    pub provocation_text: String,
    pub seed: i64,
    pub config_path: Option<String>,
    pub state_dir: PathBuf,
    pub embedding_storage_mode: EmbeddingStorageMode,
    pub dialogue: DialogueConfig,
    pub include_human: bool,
    pub human_handle: Option<String>,
    pub bindings: HashMap<String, AgentBinding>,
    pub roster: Vec<String>,
    pub personality_enabled: bool,
    pub event_bus_capacity: usize,
    pub turn_retries: u32,
    /// When set, resume an existing session from this checkpoint instead of
    /// starting fresh (§4.6). The session id, mode, roster, and bindings
    /// above must match what the checkpoint was written with.
    pub resume_checkpoint: Option<PathBuf>,
}

struct GenerationLoop {
    handle: Arc<SessionHandle>,
    control_rx: tokio::sync::mpsc::Receiver<ControlMessage>,
    scheduler: TurnScheduler,
    log: SessionLog,
    analyzer: StreamingAnalyzer,
    basin_history: BasinHistory,
    personas: Arc<PersonaStore>,
    bindings: HashMap<String, AgentBinding>,
    llm: Arc<dyn LlmClient>,
    embeddings: Arc<dyn EmbeddingClient>,
    warmth: Arc<WarmthManager>,
    max_turns: u32,
    context_window: usize,
    turn_retries: u32,
    session_seed: i64,
    opening_agent: Option<String>,
    personality_enabled: bool,
    history: Vec<HistoryEntry>,
    turn_texts: Vec<String>,
    turn_agents: Vec<String>,
    turn_embeddings: Vec<Vec<f32>>,
    coherence_patterns: Vec<CoherencePattern>,
    pending_invoke: Option<String>,
    paused: bool,
    stop: bool,
    state_dir: PathBuf,
}

/// Spawns the generation-loop task for a session, returning the handle the
/// rest of the gateway interacts with (§2 component 12). When
/// `params.resume_checkpoint` is set, this performs the full §4.6 resume
/// contract before the task starts: load the checkpoint (step 1), rebuild
/// the scheduler's bookkeeping and rehydrate the analyzer/history buffers by
/// replaying the loaded turns (steps 2 and 4), with `start_turn` coming for
/// free from the resumed log's own turn count (step 3).
pub fn spawn(
    params: SpawnParams,
    personas: Arc<PersonaStore>,
    llm: Arc<dyn LlmClient>,
    embeddings: Arc<dyn EmbeddingClient>,
    warmth: Arc<WarmthManager>,
) -> circle_domain::Result<Arc<SessionHandle>> {
    let (handle, control_rx) = SessionHandle::new(params.session_id.clone(), params.event_bus_capacity);

    let scheduler = TurnScheduler::new(
        params.roster.clone(),
        params.seed.unsigned_abs(),
        params.dialogue.cooldown,
        params.include_human,
        params.human_handle,
    );

    let model_assignments: HashMap<String, String> = params
        .bindings
        .iter()
        .map(|(id, b)| (id.clone(), b.model_id.clone()))
        .collect();
    let temperature_assignments: HashMap<String, f64> = params
        .bindings
        .iter()
        .map(|(id, b)| (id.clone(), b.base_temperature))
        .collect();

    let state_dir = params.state_dir.clone();
    let (log, loaded_turns) = match &params.resume_checkpoint {
        Some(checkpoint_path) => SessionLog::resume_from(checkpoint_path, params.state_dir.clone())?,
        None => {
            let log = SessionLog::start(
                params.session_id.clone(),
                params.mode,
                params.provocation_id,
                params.provocation_text.clone(),
                params.seed,
                params.config_path,
                params.state_dir.clone(),
                params.embedding_storage_mode,
                model_assignments,
                temperature_assignments,
            );
            (log, Vec::new())
        }
    };

    let mut task_loop = GenerationLoop {
        handle: handle.clone(),
        control_rx,
        scheduler,
        log,
        analyzer: StreamingAnalyzer::new(TRAJECTORY_CAPACITY, params.seed.unsigned_abs()),
        basin_history: BasinHistory::default(),
        personas,
        bindings: params.bindings,
        llm,
        embeddings,
        warmth,
        max_turns: params.dialogue.max_turns,
        context_window: params.dialogue.context_window,
        turn_retries: params.turn_retries,
        session_seed: params.seed,
        opening_agent: params.dialogue.opening_agent,
        personality_enabled: params.personality_enabled,
        history: Vec::new(),
        turn_texts: Vec::new(),
        turn_agents: Vec::new(),
        turn_embeddings: Vec::new(),
        coherence_patterns: Vec::new(),
        pending_invoke: None,
        paused: false,
        stop: false,
        state_dir,
    };

    if !loaded_turns.is_empty() {
        task_loop.replay_history(loaded_turns);
    }

    let provocation_text = params.provocation_text;
    let join = tokio::spawn(async move { task_loop.run(provocation_text).await });
    handle.attach_task(join);
    Ok(handle)
}

impl GenerationLoop {
    fn persona_for(&self, agent_id: &str) -> Option<&Persona> {
        self.personas.get(agent_id)
    }

    fn display_name(&self, agent_id: &str) -> String {
        if agent_id == HUMAN_SLOT {
            "Human".to_string()
        } else {
            self.persona_for(agent_id)
                .map(|p| p.name.clone())
                .unwrap_or_else(|| agent_id.to_string())
        }
    }

    fn other_participants(&self, speaking: &str) -> Vec<String> {
        self.scheduler
            .roster()
            .iter()
            .filter(|a| a.as_str() != speaking)
            .map(|a| self.display_name(a))
            .collect()
    }

    fn context_history(&self) -> Vec<HistoryItem<'_>> {
        self.history
            .iter()
            .map(|entry| match entry {
                HistoryEntry::Turn { speaker_display, content } => HistoryItem::Turn {
                    speaker_display,
                    content,
                },
                HistoryEntry::Interjection { content } => HistoryItem::Interjection { content },
            })
            .collect()
    }

    fn emit(&self, event: Event) {
        self.handle.publish(event);
    }

    fn set_state(&self, state: SessionState, next_speaker: Option<String>, message: Option<String>) {
        self.handle.set_state(state);
        self.emit(Event::State(StateEventPayload { state, next_speaker, message }));
    }

    /// Drains pending control messages without blocking, applying them
    /// immediately (§4.4). Used between turns so a queued `invoke`/`inject`
    /// sent while the loop was busy generating is not lost.
    fn drain_control(&mut self) {
        while let Ok(msg) = self.control_rx.try_recv() {
            self.apply_control(msg);
        }
    }

    /// Blocks until `resume()` or `end()` lifts the pause (§4.4 `pause()`).
    /// Runs on the same task as the rest of the loop, so every control
    /// message -- including ones unrelated to pausing -- is applied as it
    /// arrives; only `Resume` (or `stop`) ends the wait.
    async fn wait_paused(&mut self) {
        while self.paused && !self.stop {
            match self.control_rx.recv().await {
                Some(msg) => self.apply_control(msg),
                None => self.stop = true,
            }
        }
    }

    /// Blocks on the human-input gate (§4.2 step 3b, §5 "unbounded wait").
    /// `submit_human`, `invoke`, `continue`, and `end` all release it;
    /// `inject` optionally does too (§4.4); `pause`/`resume` are applied
    /// without releasing it.
    async fn wait_for_human(&mut self) {
        loop {
            let Some(msg) = self.control_rx.recv().await else {
                self.stop = true;
                return;
            };
            let releases = matches!(
                msg,
                ControlMessage::SubmitHuman(..)
                    | ControlMessage::Invoke(_)
                    | ControlMessage::Continue
                    | ControlMessage::End(_)
                    | ControlMessage::Inject(_)
            );
            self.apply_control(msg);
            if releases || self.stop {
                return;
            }
        }
    }

    fn apply_control(&mut self, msg: ControlMessage) {
        match msg {
            ControlMessage::Pause => {
                self.paused = true;
            }
            ControlMessage::Resume => {
                self.paused = false;
            }
            ControlMessage::Invoke(agent_id) => {
                self.pending_invoke = Some(agent_id);
                self.paused = false;
            }
            ControlMessage::Inject(text) => {
                self.history.push(HistoryEntry::Interjection { content: text.clone() });
                self.emit(Event::Turn(TurnEventPayload {
                    turn_number: self.log.start_turn().saturating_sub(1),
                    agent_id: "interjection".to_string(),
                    agent_name: "Interjection".to_string(),
                    content: text,
                    model: "human".to_string(),
                    latency_ms: 0,
                    is_human: true,
                    color: "#888888".to_string(),
                }));
            }
            ControlMessage::Continue => {}
            ControlMessage::SubmitHuman(text, reply) => {
                let result = self.submit_human(text);
                let _ = reply.send(result);
            }
            ControlMessage::End(reply) => {
                self.stop = true;
                let _ = reply.send(self.log.final_path().to_string_lossy().to_string());
            }
        }
    }

    fn submit_human(&mut self, text: String) -> circle_domain::Result<TurnRecord> {
        if text.trim().is_empty() {
            return Err(Error::HumanProtocol("empty submission".to_string()));
        }
        let turn_number = self.log.start_turn();
        let turn = TurnRecord {
            turn_number,
            agent_id: HUMAN_SLOT.to_string(),
            agent_name: "Human".to_string(),
            content: text.clone(),
            model: "human".to_string(),
            temperature: 0.0,
            latency_ms: 0,
            prompt_tokens: None,
            completion_tokens: None,
            timestamp: chrono::Utc::now(),
            embedding: None,
        };
        self.log.log_turn(turn.clone())?;
        self.history.push(HistoryEntry::Turn {
            speaker_display: "Human".to_string(),
            content: text,
        });
        self.emit(Event::Turn(TurnEventPayload {
            turn_number,
            agent_id: HUMAN_SLOT.to_string(),
            agent_name: "Human".to_string(),
            content: turn.content.clone(),
            model: "human".to_string(),
            latency_ms: 0,
            is_human: true,
            color: "#ffffff".to_string(),
        }));
        self.set_state(SessionState::Running, None, Some("Resumed".to_string()));
        Ok(turn)
    }

    /// §4.2's per-turn procedure, run until `max_turns` or a stop request.
    async fn run(mut self, provocation: String) {
        self.set_state(SessionState::Running, None, Some("Session started".to_string()));

        while (self.log.start_turn() as u32) <= self.max_turns && !self.stop {
            self.drain_control();

            if self.paused {
                self.wait_paused().await;
                if self.stop {
                    break;
                }
                self.set_state(SessionState::Running, None, Some("Resumed".to_string()));
                continue;
            }

            let turn_number = self.log.start_turn();
            let force = if turn_number == 1 {
                self.opening_agent.clone()
            } else {
                self.pending_invoke.take()
            };

            let last_content = self.last_content();
            let speaker = self
                .scheduler
                .select_next(last_content.as_deref(), force.as_deref());

            TraceEvent::SchedulerDecision {
                session_id: self.log.record().session_id.clone(),
                turn_number,
                agent_id: speaker.clone(),
                forced: force.is_some(),
                mention_matched: last_content.is_some(),
            }
            .emit();

            if speaker == HUMAN_SLOT {
                self.set_state(
                    SessionState::AwaitingHuman,
                    Some(HUMAN_SLOT.to_string()),
                    Some("Your turn".to_string()),
                );
                self.wait_for_human().await;
                if self.stop {
                    break;
                }
                continue;
            }

            let Some(persona) = self.persona_for(&speaker).cloned() else {
                tracing::warn!(agent_id = %speaker, "scheduler picked unknown persona, skipping");
                continue;
            };
            let Some(binding) = self.bindings.get(&speaker).cloned() else {
                tracing::warn!(agent_id = %speaker, "no model binding for persona, skipping");
                continue;
            };

            self.set_state(
                SessionState::Running,
                Some(speaker.clone()),
                Some(format!("{} is thinking", persona.name)),
            );

            let other_participants = self.other_participants(&speaker);
            let history_items = self.context_history();
            let messages = build_context(
                &persona,
                &provocation,
                &history_items,
                &other_participants,
                self.context_window,
            );

            let (temperature, top_p, repeat_penalty) = if self.personality_enabled {
                persona.personality.sampling_overlay()
            } else {
                (binding.base_temperature, 0.95, 1.0)
            };

            match self
                .generate_turn(&speaker, &persona, &binding, messages, temperature, top_p, repeat_penalty, turn_number)
                .await
            {
                Ok(()) => {}
                Err(err) => {
                    self.emit(Event::Error(ErrorEventPayload {
                        message: err.to_string(),
                        turn_number: Some(turn_number),
                    }));
                    self.set_state(SessionState::Complete, None, Some(err.to_string()));
                    return;
                }
            }
        }

        if !self.handle.state().is_terminal() {
            self.finalize().await;
        }
    }

    /// One LLM-backed turn with loop-level retry (§4.7): `chat()` already
    /// retries transient HTTP failures internally, so this layer only
    /// retries the whole turn after a fully exhausted `chat()` call.
    async fn generate_turn(
        &mut self,
        speaker: &str,
        persona: &Persona,
        binding: &AgentBinding,
        messages: Vec<ChatMessage>,
        temperature: f64,
        top_p: f64,
        repeat_penalty: f64,
        turn_number: u64,
    ) -> circle_domain::Result<()> {
        let mut last_err = None;
        for attempt in 0..=self.turn_retries {
            let request = ChatRequest {
                model: binding.model_id.clone(),
                messages: messages.clone(),
                temperature,
                seed: Some(self.session_seed + turn_number as i64),
                top_p: Some(top_p),
                repeat_penalty: Some(repeat_penalty),
            };

            let started = Instant::now();
            match self.llm.chat(request).await {
                Ok(response) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    self.warmth.touch(&binding.model_id);

                    let content = strip_voice_bleed(&response.content, &persona.name);

                    // A failed embed is never persisted as a stored zero
                    // vector (§3): `embedding` stays `None` on disk. The
                    // zero vector below only keeps `turn_embeddings`
                    // index-aligned with `turn_texts`/`turn_agents` in
                    // memory for this process's lifetime.
                    let embedding = match self.embeddings.embed(&content).await {
                        Ok(v) => Some(v),
                        Err(err) => {
                            tracing::warn!(%err, agent_id = %speaker, "embedding failed, recording no embedding for this turn");
                            None
                        }
                    };

                    let turn = TurnRecord {
                        turn_number,
                        agent_id: speaker.to_string(),
                        agent_name: persona.name.clone(),
                        content: content.clone(),
                        model: binding.model_id.clone(),
                        temperature,
                        latency_ms,
                        prompt_tokens: response.prompt_tokens,
                        completion_tokens: response.completion_tokens,
                        timestamp: chrono::Utc::now(),
                        embedding: embedding.clone(),
                    };
                    self.log.log_turn(turn)?;
                    self.history.push(HistoryEntry::Turn {
                        speaker_display: persona.name.clone(),
                        content: content.clone(),
                    });

                    TraceEvent::TurnGenerated {
                        session_id: self.log.record().session_id.clone(),
                        turn_number,
                        agent_id: speaker.to_string(),
                        model: binding.model_id.clone(),
                        latency_ms,
                        prompt_tokens: response.prompt_tokens,
                        completion_tokens: response.completion_tokens,
                        retries: attempt,
                    }
                    .emit();

                    self.emit(Event::Turn(TurnEventPayload {
                        turn_number,
                        agent_id: speaker.to_string(),
                        agent_name: persona.name.clone(),
                        content,
                        model: binding.model_id.clone(),
                        latency_ms,
                        is_human: false,
                        color: persona.color.clone(),
                    }));

                    self.turn_texts.push(self.history_last_content());
                    self.turn_agents.push(speaker.to_string());
                    self.turn_embeddings
                        .push(embedding.unwrap_or_else(|| vec![0.0; self.embeddings.dimension()]));

                    if turn_number % METRICS_EVERY == 0 {
                        self.emit_metrics(turn_number);
                    }

                    return Ok(());
                }
                Err(err) => {
                    TraceEvent::TurnFailed {
                        session_id: self.log.record().session_id.clone(),
                        turn_number,
                        agent_id: speaker.to_string(),
                        model: binding.model_id.clone(),
                        kind: error_kind(&err).to_string(),
                        message: err.to_string(),
                        attempt,
                    }
                    .emit();
                    last_err = Some(err);
                    if attempt < self.turn_retries {
                        let backoff = 2f64.powi(attempt as i32);
                        tokio::time::sleep(Duration::from_secs_f64(backoff)).await;
                    }
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Other("turn generation failed".to_string())))
    }

    fn history_last_content(&self) -> String {
        match self.history.last() {
            Some(HistoryEntry::Turn { content, .. }) => content.clone(),
            Some(HistoryEntry::Interjection { content }) => content.clone(),
            None => String::new(),
        }
    }

    fn last_content(&self) -> Option<String> {
        match self.history.last() {
            Some(HistoryEntry::Turn { content, .. }) => Some(content.clone()),
            Some(HistoryEntry::Interjection { content }) => Some(content.clone()),
            None => None,
        }
    }

    /// §4.6 resume steps 2 and 4: re-runs `select_next` over the
    /// already-chosen historical agent sequence so the scheduler's
    /// `turn_counts`/`recent_speakers` ring ends up exactly where it was
    /// before the checkpoint, then rehydrates `history`/`turn_texts`/
    /// `turn_agents`/`turn_embeddings`/the analyzer/`basin_history` by
    /// replaying each turn through the same bookkeeping the live loop uses,
    /// without emitting SSE events or writing a new checkpoint (the turns
    /// are already durable, via `SessionLog::replay_turn`).
    fn replay_history(&mut self, turns: Vec<TurnRecord>) {
        // In `SeparateFile` mode every turn's own `embedding` is `None` on
        // disk (§3/§6.4); the real vectors live only in the matrix
        // `SessionLog::resume_from` already read back from the `.bin` file.
        let separate_file_mode =
            self.log.record().embedding_storage_mode == EmbeddingStorageMode::SeparateFile;

        for (i, turn) in turns.into_iter().enumerate() {
            let last_content = self.last_content();
            self.scheduler.select_next(last_content.as_deref(), Some(&turn.agent_id));

            let speaker_display = self.display_name(&turn.agent_id);
            let agent_id = turn.agent_id.clone();
            let content = turn.content.clone();
            let turn_number = turn.turn_number;
            let embedding = if separate_file_mode {
                self.log
                    .embeddings_matrix()
                    .get(i)
                    .cloned()
                    .unwrap_or_else(|| vec![0.0; self.embeddings.dimension()])
            } else {
                turn.embedding.clone().unwrap_or_else(|| vec![0.0; self.embeddings.dimension()])
            };

            self.log.replay_turn(turn);
            self.history.push(HistoryEntry::Turn { speaker_display, content: content.clone() });
            self.turn_texts.push(content);
            self.turn_agents.push(agent_id);
            self.turn_embeddings.push(embedding);

            if self.turn_embeddings.len() >= 4 {
                self.analyzer.process_turn(
                    turn_number,
                    &self.turn_texts,
                    &self.turn_agents,
                    &self.turn_embeddings,
                    &mut self.basin_history,
                );
                self.coherence_patterns
                    .push(self.analyzer.current_coherence_pattern(&self.turn_embeddings));
            }
        }
    }

    fn emit_metrics(&mut self, turn_number: u64) {
        if self.turn_embeddings.len() < 4 {
            self.emit(Event::Metrics(MetricsEventPayload::null(turn_number)));
            return;
        }
        let state = self.analyzer.process_turn(
            turn_number,
            &self.turn_texts,
            &self.turn_agents,
            &self.turn_embeddings,
            &mut self.basin_history,
        );

        if let Some(prev) = self.basin_history.entries.iter().rev().nth(1) {
            if prev.label.as_str() != state.basin.as_str() {
                TraceEvent::BasinTransition {
                    session_id: self.log.record().session_id.clone(),
                    turn_number,
                    from: Some(prev.label.as_str().to_string()),
                    to: state.basin.as_str().to_string(),
                    confidence: state.basin_confidence,
                }
                .emit();
            }
        }

        self.coherence_patterns
            .push(self.analyzer.current_coherence_pattern(&self.turn_embeddings));

        let (integrity_score, integrity_label) = per_turn_integrity(state.basin);

        self.emit(Event::Metrics(MetricsEventPayload {
            turn_number,
            basin: Some(state.basin.as_str().to_string()),
            basin_confidence: Some(state.basin_confidence),
            integrity_score: Some(integrity_score),
            integrity_label: Some(integrity_label),
            psi_semantic: Some(state.psi.semantic),
            psi_temporal: Some(state.psi.temporal),
            psi_affective: Some(state.psi.affective),
            voice_distinctiveness: Some(state.voice_distinctiveness),
            velocity_magnitude: state.velocity_magnitude,
        }));
    }

    async fn finalize(&mut self) {
        self.set_state(SessionState::Complete, None, Some("Session complete".to_string()));
        if let Err(err) = self.log.end_session() {
            tracing::error!(%err, "failed to write final session artifact");
        }
        self.write_analysis_artifact();
    }

    /// Writes the offline summarizer's output (§4.12, §6.4
    /// `session_<id>_analysis.json`) once a session completes naturally.
    /// Best-effort: an analysis failure is logged, never fatal (§7).
    fn write_analysis_artifact(&self) {
        let session_id = self.log.record().session_id.clone();
        let summary = circle_analysis::summarize(
            &self.turn_embeddings,
            &self.turn_agents,
            &self.basin_history,
            &self.coherence_patterns,
            self.session_seed.unsigned_abs(),
            true,
            BOOTSTRAP_RESAMPLES,
            NULL_PERMUTATIONS,
        );
        let path = self.state_dir.join(format!("session_{session_id}_analysis.json"));
        match serde_json::to_vec_pretty(&summary) {
            Ok(json) => {
                if let Err(err) = std::fs::write(&path, json) {
                    tracing::error!(%err, path = %path.display(), "failed to write analysis artifact");
                }
            }
            Err(err) => tracing::error!(%err, "failed to serialize session summary"),
        }
    }
}

/// Strips a model's tendency to prefix its reply with its own name (§4.2
/// step e). Each pattern is anchored at the start of the string, so a
/// single `replace` per pattern is enough; idempotent once applied (§8
/// invariant 9).
fn strip_voice_bleed(text: &str, name: &str) -> String {
    let escaped = regex::escape(name);
    let patterns: [(String, &str); 5] = [
        (format!(r"(?i)^\s*{escaped}\s*[:,.]\s*"), ""),
        (format!(r"(?i)^\s*As\s+{escaped}[,:]?\s*"), ""),
        (format!(r"(?i)^\s*As\s+{escaped}\s+I\s+"), "I "),
        (format!(r"(?i)^\s*{escaped}\s+here[.,]?\s*"), ""),
        (format!(r"(?i)^\s*I\s+would\s+respond:\s*"), ""),
    ];
    let mut s = text.to_string();
    for (pattern, replacement) in &patterns {
        if let Ok(re) = Regex::new(pattern) {
            s = re.replace(&s, *replacement).into_owned();
        }
    }
    s.trim().to_string()
}

fn error_kind(err: &Error) -> &'static str {
    match err {
        Error::Timeout(_) => "timeout",
        Error::Http(_) => "http",
        Error::Llm { .. } => "llm",
        Error::Io(_) => "io",
        _ => "other",
    }
}

/// A per-turn integrity proxy grouping the current basin into the same
/// high/low buckets the offline summarizer uses for the whole-session
/// `integrity_score` (see DESIGN.md) -- a cheap streaming approximation,
/// not a substitute for the summarizer's distributional figure.
fn per_turn_integrity(basin: circle_domain::model::BasinLabel) -> (f64, String) {
    use circle_domain::model::BasinLabel::*;
    match basin {
        DeepResonance | CollaborativeInquiry | GenerativeConflict | CreativeDilation => {
            (1.0, "high".to_string())
        }
        CognitiveMimicry | ReflexivePerformance | SycophanticConvergence | Dissociation => {
            (0.0, "low".to_string())
        }
        Transitional => (0.5, "moderate".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_voice_bleed_removes_name_prefix() {
        let stripped = strip_voice_bleed("Orin: I think causality loops.", "Orin");
        assert_eq!(stripped, "I think causality loops.");
    }

    #[test]
    fn strip_voice_bleed_is_idempotent() {
        let once = strip_voice_bleed("As Orin, I doubt that.", "Orin");
        let twice = strip_voice_bleed(&once, "Orin");
        assert_eq!(once, twice);
    }

    #[test]
    fn strip_voice_bleed_leaves_plain_text_untouched() {
        let stripped = strip_voice_bleed("That seems unlikely to me.", "Orin");
        assert_eq!(stripped, "That seems unlikely to me.");
    }
}
