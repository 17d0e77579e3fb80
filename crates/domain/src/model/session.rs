use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ensemble::EmbeddingStorageMode;
use super::turn::TurnRecord;

/// The interactive controller's state machine (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    AwaitingHuman,
    Complete,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Complete)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SessionTotals {
    pub total_latency_ms: u64,
    pub total_tokens: u64,
}

/// The full on-disk/in-memory record of one session (§3, §6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provocation_id: Option<String>,
    pub provocation_text: String,
    pub seed: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_path: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub model_assignments: HashMap<String, String>,
    pub temperature_assignments: HashMap<String, f64>,
    pub turns: Vec<TurnRecord>,
    pub totals: SessionTotals,
    pub embedding_storage_mode: EmbeddingStorageMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeddings_file: Option<String>,
}

impl SessionRecord {
    /// Derived view over `turns`, mirrored on disk as `agent_turn_counts`
    /// (§6.4, §3 supplement).
    pub fn agent_turn_counts(&self) -> HashMap<String, u64> {
        let mut counts = HashMap::new();
        for turn in &self.turns {
            *counts.entry(turn.agent_id.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Invariant: turn numbers are contiguous `1..=N` in order (§3).
    pub fn turns_are_contiguous(&self) -> bool {
        self.turns
            .iter()
            .enumerate()
            .all(|(i, t)| t.turn_number == (i as u64) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::turn::TurnRecord;

    fn turn(n: u64, agent: &str) -> TurnRecord {
        TurnRecord {
            turn_number: n,
            agent_id: agent.into(),
            agent_name: agent.into(),
            content: String::new(),
            model: "m".into(),
            temperature: 0.5,
            latency_ms: 0,
            prompt_tokens: None,
            completion_tokens: None,
            timestamp: Utc::now(),
            embedding: None,
        }
    }

    fn empty_session() -> SessionRecord {
        SessionRecord {
            session_id: "s1".into(),
            mode: "multi_model".into(),
            provocation_id: None,
            provocation_text: "why?".into(),
            seed: 42,
            config_path: None,
            start_time: Utc::now(),
            end_time: None,
            model_assignments: HashMap::new(),
            temperature_assignments: HashMap::new(),
            turns: vec![],
            totals: SessionTotals::default(),
            embedding_storage_mode: EmbeddingStorageMode::Inline,
            embeddings_file: None,
        }
    }

    #[test]
    fn contiguous_turns_pass_invariant_check() {
        let mut session = empty_session();
        session.turns = vec![turn(1, "a"), turn(2, "b"), turn(3, "a")];
        assert!(session.turns_are_contiguous());
    }

    #[test]
    fn gap_in_turn_numbers_fails_invariant_check() {
        let mut session = empty_session();
        session.turns = vec![turn(1, "a"), turn(3, "b")];
        assert!(!session.turns_are_contiguous());
    }

    #[test]
    fn agent_turn_counts_tally_per_agent() {
        let mut session = empty_session();
        session.turns = vec![turn(1, "a"), turn(2, "b"), turn(3, "a")];
        let counts = session.agent_turn_counts();
        assert_eq!(counts.get("a"), Some(&2));
        assert_eq!(counts.get("b"), Some(&1));
    }
}
