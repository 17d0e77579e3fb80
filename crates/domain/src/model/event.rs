use serde::{Deserialize, Serialize};

use super::session::SessionState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnEventPayload {
    pub turn_number: u64,
    pub agent_id: String,
    pub agent_name: String,
    pub content: String,
    pub model: String,
    pub latency_ms: u64,
    pub is_human: bool,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateEventPayload {
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_speaker: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsEventPayload {
    pub turn_number: u64,
    pub basin: Option<String>,
    pub basin_confidence: Option<f64>,
    pub integrity_score: Option<f64>,
    pub integrity_label: Option<String>,
    pub psi_semantic: Option<f64>,
    pub psi_temporal: Option<f64>,
    pub psi_affective: Option<f64>,
    pub voice_distinctiveness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub velocity_magnitude: Option<f64>,
}

impl MetricsEventPayload {
    /// An all-null metrics frame, emitted when the analyzer fails on a
    /// turn (§7: analysis errors are never fatal).
    pub fn null(turn_number: u64) -> Self {
        Self {
            turn_number,
            basin: None,
            basin_confidence: None,
            integrity_score: None,
            integrity_label: None,
            psi_semantic: None,
            psi_temporal: None,
            psi_affective: None,
            voice_distinctiveness: None,
            velocity_magnitude: None,
        }
    }
}

/// A fatal per-session failure (§7: "the streaming channel surfaces fatal
/// per-session failures as `event: error` followed by a terminal
/// `state: complete`").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEventPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_number: Option<u64>,
}

/// The four event variants pushed onto the Event Bus and serialized as SSE
/// frames (§4.5, §6.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Turn(TurnEventPayload),
    State(StateEventPayload),
    Metrics(MetricsEventPayload),
    Error(ErrorEventPayload),
}

impl Event {
    /// Key used by clients to de-duplicate events seen more than once
    /// across reconnection (§4.5, §8 invariant 7). `None` for state and
    /// error events, which are not keyed by turn/agent.
    pub fn dedup_key(&self, session_id: &str) -> Option<(String, u64, String)> {
        match self {
            Event::Turn(t) => Some((session_id.to_string(), t.turn_number, t.agent_id.clone())),
            Event::Metrics(m) => Some((session_id.to_string(), m.turn_number, "metrics".to_string())),
            Event::State(_) | Event::Error(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_event_serializes_with_type_tag() {
        let event = Event::Turn(TurnEventPayload {
            turn_number: 1,
            agent_id: "a".into(),
            agent_name: "A".into(),
            content: "hi".into(),
            model: "llama3".into(),
            latency_ms: 10,
            is_human: false,
            color: "#fff".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "turn");
    }

    #[test]
    fn null_metrics_has_no_basin() {
        let metrics = MetricsEventPayload::null(3);
        assert!(metrics.basin.is_none());
        assert_eq!(metrics.turn_number, 3);
    }

    #[test]
    fn dedup_key_present_for_turn_absent_for_state() {
        let turn = Event::Turn(TurnEventPayload {
            turn_number: 2,
            agent_id: "b".into(),
            agent_name: "B".into(),
            content: String::new(),
            model: "m".into(),
            latency_ms: 0,
            is_human: false,
            color: String::new(),
        });
        assert!(turn.dedup_key("s1").is_some());

        let state = Event::State(StateEventPayload {
            state: SessionState::Running,
            next_speaker: None,
            message: None,
        });
        assert!(state.dedup_key("s1").is_none());
    }

    #[test]
    fn error_event_serializes_with_type_tag_and_no_dedup_key() {
        let event = Event::Error(ErrorEventPayload {
            message: "llm backend unreachable".into(),
            turn_number: Some(4),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["turn_number"], 4);
        assert!(event.dedup_key("s1").is_none());
    }

    #[test]
    fn error_event_omits_turn_number_when_absent() {
        let event = Event::Error(ErrorEventPayload { message: "config error".into(), turn_number: None });
        let json = serde_json::to_value(&event).unwrap();
        assert!(json.get("turn_number").is_none());
    }
}
