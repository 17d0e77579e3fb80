use serde::{Deserialize, Serialize};

fn d_base_url() -> String {
    "http://localhost:11434".to_string()
}

fn d_timeout_secs() -> u64 {
    600
}

fn d_max_retries() -> u32 {
    3
}

fn d_liveness_timeout_secs() -> u64 {
    2
}

fn d_warm_timeout_secs() -> u64 {
    30
}

fn d_warmth_interval_secs() -> u64 {
    180
}

fn d_turn_retries() -> u32 {
    3
}

fn d_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

fn d_embedding_dimension() -> usize {
    768
}

/// Connection and retry parameters for the single chat backend this engine
/// consumes, plus the cadence of the warmth-keeping background worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "d_max_retries")]
    pub max_retries: u32,
    #[serde(default = "d_liveness_timeout_secs")]
    pub liveness_timeout_secs: u64,
    #[serde(default = "d_warm_timeout_secs")]
    pub warm_timeout_secs: u64,
    #[serde(default = "d_warmth_interval_secs")]
    pub warmth_interval_secs: u64,
    #[serde(default = "d_turn_retries")]
    pub turn_retries: u32,
    /// Model used for the §4.6 embedding side-channel (distinct from the
    /// per-agent chat models in an ensemble config).
    #[serde(default = "d_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "d_embedding_dimension")]
    pub embedding_dimension: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_base_url(),
            timeout_secs: d_timeout_secs(),
            max_retries: d_max_retries(),
            liveness_timeout_secs: d_liveness_timeout_secs(),
            warm_timeout_secs: d_warm_timeout_secs(),
            warmth_interval_secs: d_warmth_interval_secs(),
            turn_retries: d_turn_retries(),
            embedding_model: d_embedding_model(),
            embedding_dimension: d_embedding_dimension(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_600s() {
        assert_eq!(LlmConfig::default().timeout_secs, 600);
    }

    #[test]
    fn default_max_retries_is_3() {
        assert_eq!(LlmConfig::default().max_retries, 3);
    }

    #[test]
    fn default_warmth_interval_is_180s() {
        assert_eq!(LlmConfig::default().warmth_interval_secs, 180);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: LlmConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.base_url, "http://localhost:11434");
    }
}
