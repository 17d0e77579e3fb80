use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsembleMode {
    SingleModel,
    MultiModel,
}

/// Whether embeddings are stored inline in the session JSON or in a
/// companion binary file (§4.6, §9 open question 2). Fixed for the
/// lifetime of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStorageMode {
    Inline,
    SeparateFile,
}

impl Default for EmbeddingStorageMode {
    fn default() -> Self {
        EmbeddingStorageMode::Inline
    }
}

/// A per-agent model binding: either a bare model string or an object with
/// an explicit temperature override (§6.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AgentSpec {
    ModelString(String),
    Detailed { model: String, temperature: Option<f64> },
}

impl AgentSpec {
    pub fn model(&self) -> &str {
        match self {
            AgentSpec::ModelString(m) => m,
            AgentSpec::Detailed { model, .. } => model,
        }
    }

    pub fn temperature(&self) -> Option<f64> {
        match self {
            AgentSpec::ModelString(_) => None,
            AgentSpec::Detailed { temperature, .. } => *temperature,
        }
    }
}

fn d_max_turns() -> u32 {
    20
}

fn d_context_window() -> usize {
    10
}

fn d_cooldown() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueConfig {
    #[serde(default = "d_max_turns")]
    pub max_turns: u32,
    #[serde(default = "d_context_window")]
    pub context_window: usize,
    #[serde(default)]
    pub opening_agent: Option<String>,
    #[serde(default = "d_cooldown")]
    pub cooldown: u32,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            max_turns: d_max_turns(),
            context_window: d_context_window(),
            opening_agent: None,
            cooldown: d_cooldown(),
        }
    }
}

/// The ensemble document submitted at `POST /session/start` (§6.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleConfig {
    #[serde(default = "default_mode")]
    pub mode: EnsembleMode,
    #[serde(default)]
    pub shared_model: Option<String>,
    #[serde(default)]
    pub agents: HashMap<String, AgentSpec>,
    #[serde(default)]
    pub dialogue: DialogueConfig,
    #[serde(default)]
    pub personality_enabled: bool,
    #[serde(default)]
    pub embedding_storage_mode: EmbeddingStorageMode,
    #[serde(default)]
    pub include_human: bool,
}

fn default_mode() -> EnsembleMode {
    EnsembleMode::MultiModel
}

/// Sampling parameters passed to the LLM backend for one turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SamplingParams {
    pub temperature: f64,
    pub top_p: f64,
    pub repeat_penalty: f64,
    pub seed: i64,
}

/// The binding of a persona to a backing model and its base sampling
/// parameters, created once at session start from the ensemble config.
#[derive(Debug, Clone, Serialize)]
pub struct AgentBinding {
    pub persona_id: String,
    pub model_id: String,
    pub base_temperature: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_spec_model_string_has_no_temperature() {
        let spec = AgentSpec::ModelString("llama3".into());
        assert_eq!(spec.model(), "llama3");
        assert!(spec.temperature().is_none());
    }

    #[test]
    fn agent_spec_detailed_carries_temperature() {
        let spec = AgentSpec::Detailed {
            model: "llama3".into(),
            temperature: Some(0.7),
        };
        assert_eq!(spec.temperature(), Some(0.7));
    }

    #[test]
    fn default_embedding_storage_is_inline() {
        assert_eq!(EmbeddingStorageMode::default(), EmbeddingStorageMode::Inline);
    }

    #[test]
    fn default_dialogue_cooldown_is_one() {
        assert_eq!(DialogueConfig::default().cooldown, 1);
    }
}
