use serde::{Deserialize, Serialize};

fn d_service_name() -> String {
    "circle".to_string()
}

fn d_sample_rate() -> f64 {
    1.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default = "d_service_name")]
    pub service_name: String,
    #[serde(default = "d_sample_rate")]
    pub sample_rate: f64,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            otlp_endpoint: None,
            service_name: d_service_name(),
            sample_rate: d_sample_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_no_endpoint() {
        assert!(ObservabilityConfig::default().otlp_endpoint.is_none());
    }

    #[test]
    fn default_service_name_is_circle() {
        assert_eq!(ObservabilityConfig::default().service_name, "circle");
    }

    #[test]
    fn default_sample_rate_is_one() {
        assert_eq!(ObservabilityConfig::default().sample_rate, 1.0);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: ObservabilityConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.service_name, "circle");
    }

    #[test]
    fn deserialize_with_endpoint() {
        let cfg: ObservabilityConfig =
            toml::from_str("otlp_endpoint = \"http://localhost:4317\"\n").unwrap();
        assert_eq!(cfg.otlp_endpoint.as_deref(), Some("http://localhost:4317"));
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ObservabilityConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ObservabilityConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.service_name, cfg.service_name);
    }
}
