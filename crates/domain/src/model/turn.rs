use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed utterance, owned by the Session Log. Appended once, never
/// mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_number: u64,
    pub agent_id: String,
    pub agent_name: String,
    pub content: String,
    pub model: String,
    pub temperature: f64,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl TurnRecord {
    pub fn is_human(&self) -> bool {
        self.model == "human"
    }
}

/// A failed generation attempt, recorded regardless of whether a later
/// attempt for the same turn succeeds (§4.7, §7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnError {
    pub turn: u64,
    pub agent: String,
    pub model: String,
    pub kind: String,
    pub message: String,
    pub attempt: u32,
    pub timestamp: DateTime<Utc>,
}

/// A researcher interjection: visible to subsequent context builds, does
/// not occupy a turn number (§4.4 `inject`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interjection {
    pub after_turn: u64,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_turn_is_identified_by_model_field() {
        let turn = TurnRecord {
            turn_number: 1,
            agent_id: "human".into(),
            agent_name: "Human".into(),
            content: "hi".into(),
            model: "human".into(),
            temperature: 0.0,
            latency_ms: 0,
            prompt_tokens: None,
            completion_tokens: None,
            timestamp: Utc::now(),
            embedding: None,
        };
        assert!(turn.is_human());
    }
}
