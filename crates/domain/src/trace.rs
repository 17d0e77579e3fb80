use serde::Serialize;

/// Structured trace events emitted across all circle crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionStarted {
        session_id: String,
        mode: String,
        agent_count: usize,
        seed: i64,
    },
    SessionEnded {
        session_id: String,
        turn_count: usize,
        total_latency_ms: u64,
    },
    TurnGenerated {
        session_id: String,
        turn_number: u64,
        agent_id: String,
        model: String,
        latency_ms: u64,
        prompt_tokens: Option<u32>,
        completion_tokens: Option<u32>,
        retries: u32,
    },
    SchedulerDecision {
        session_id: String,
        turn_number: u64,
        agent_id: String,
        forced: bool,
        mention_matched: bool,
    },
    CheckpointWritten {
        session_id: String,
        turn_number: u64,
        path: String,
    },
    WarmthPing {
        model: String,
        success: bool,
        duration_ms: u64,
    },
    AnalyzerFailure {
        session_id: String,
        turn_number: u64,
        reason: String,
    },
    TurnFailed {
        session_id: String,
        turn_number: u64,
        agent_id: String,
        model: String,
        kind: String,
        message: String,
        attempt: u32,
    },
    BasinTransition {
        session_id: String,
        turn_number: u64,
        from: Option<String>,
        to: String,
        confidence: f64,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "circle_event");
    }
}
