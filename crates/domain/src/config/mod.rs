mod llm;
mod observability;
mod personas;
mod server;
mod sessions;

pub use llm::LlmConfig;
pub use observability::ObservabilityConfig;
pub use personas::PersonaSourceConfig;
pub use server::ServerConfig;
pub use sessions::SessionsConfig;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "[ERROR]",
            ConfigSeverity::Warning => "[WARN]",
        };
        write!(f, "{tag} {}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub personas: PersonaSourceConfig,
}

impl Config {
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut issues = Vec::new();

        if self.server.port == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must not be 0".into(),
            });
        }
        if self.server.host.trim().is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }
        if self.server.cors_allowed_origins.iter().any(|o| o == "*") {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors_allowed_origins".into(),
                message: "wildcard origin allows any site to call this API".into(),
            });
        }

        if self.llm.base_url.trim().is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.base_url".into(),
                message: "base_url must not be empty".into(),
            });
        } else if !(self.llm.base_url.starts_with("http://") || self.llm.base_url.starts_with("https://")) {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.base_url".into(),
                message: "base_url must start with http:// or https://".into(),
            });
        }
        if self.llm.timeout_secs == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "llm.timeout_secs".into(),
                message: "timeout_secs must be greater than 0".into(),
            });
        }
        if self.llm.warmth_interval_secs == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "llm.warmth_interval_secs".into(),
                message: "a zero warmth interval pings on every tick".into(),
            });
        }

        if self.sessions.state_dir.trim().is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.state_dir".into(),
                message: "state_dir must not be empty".into(),
            });
        }
        if self.sessions.event_bus_capacity == 0 {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "sessions.event_bus_capacity".into(),
                message: "event_bus_capacity must be greater than 0".into(),
            });
        }

        if self.personas.templates_dir.trim().is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "personas.templates_dir".into(),
                message: "templates_dir must not be empty".into(),
            });
        }
        if self.personas.personas_dir.trim().is_empty() {
            issues.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "personas.personas_dir".into(),
                message: "personas_dir must not be empty".into(),
            });
        }

        if let Some(rate) = Some(self.observability.sample_rate) {
            if !(0.0..=1.0).contains(&rate) {
                issues.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: "observability.sample_rate".into(),
                    message: "sample_rate must be within [0, 1]".into(),
                });
            }
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config::default()
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|i| i.field.starts_with(field_prefix))
    }

    #[test]
    fn default_config_has_no_errors() {
        let issues = valid_config().validate();
        assert!(issues.iter().all(|i| i.severity != ConfigSeverity::Error));
    }

    #[test]
    fn zero_port_is_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.port").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Error);
    }

    #[test]
    fn empty_host_is_error() {
        let mut cfg = valid_config();
        cfg.server.host = "".into();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "server.host").is_some());
    }

    #[test]
    fn wildcard_cors_is_warning_not_error() {
        let mut cfg = valid_config();
        cfg.server.cors_allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        let issue = find_issue(&issues, "server.cors_allowed_origins").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn empty_base_url_is_error() {
        let mut cfg = valid_config();
        cfg.llm.base_url = "".into();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "llm.base_url").is_some());
    }

    #[test]
    fn base_url_without_scheme_is_error() {
        let mut cfg = valid_config();
        cfg.llm.base_url = "localhost:11434".into();
        let issues = cfg.validate();
        assert!(find_issue(&issues, "llm.base_url").is_some());
    }

    #[test]
    fn zero_timeout_is_error() {
        let mut cfg = valid_config();
        cfg.llm.timeout_secs = 0;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "llm.timeout_secs").is_some());
    }

    #[test]
    fn zero_warmth_interval_is_warning() {
        let mut cfg = valid_config();
        cfg.llm.warmth_interval_secs = 0;
        let issues = cfg.validate();
        let issue = find_issue(&issues, "llm.warmth_interval_secs").unwrap();
        assert_eq!(issue.severity, ConfigSeverity::Warning);
    }

    #[test]
    fn zero_event_bus_capacity_is_error() {
        let mut cfg = valid_config();
        cfg.sessions.event_bus_capacity = 0;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "sessions.event_bus_capacity").is_some());
    }

    #[test]
    fn out_of_range_sample_rate_is_error() {
        let mut cfg = valid_config();
        cfg.observability.sample_rate = 1.5;
        let issues = cfg.validate();
        assert!(find_issue(&issues, "observability.sample_rate").is_some());
    }

    #[test]
    fn config_error_display_includes_tag() {
        let issue = ConfigError {
            severity: ConfigSeverity::Error,
            field: "x".into(),
            message: "y".into(),
        };
        assert_eq!(issue.to_string(), "[ERROR] x: y");
    }
}
