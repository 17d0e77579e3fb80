use serde::{Deserialize, Serialize};

fn d_host() -> String {
    "127.0.0.1".to_string()
}

fn d_port() -> u16 {
    8910
}

fn d_api_token_env() -> String {
    "SA_CIRCLE_API_TOKEN".to_string()
}

fn d_max_concurrent() -> usize {
    256
}

fn d_cors_allowed_origins() -> Vec<String> {
    Vec::new()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_host")]
    pub host: String,
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_api_token_env")]
    pub api_token_env: String,
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "d_cors_allowed_origins")]
    pub cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: d_host(),
            port: d_port(),
            api_token_env: d_api_token_env(),
            max_concurrent: d_max_concurrent(),
            cors_allowed_origins: d_cors_allowed_origins(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_host_is_loopback() {
        assert_eq!(ServerConfig::default().host, "127.0.0.1");
    }

    #[test]
    fn default_port_is_nonzero() {
        assert_ne!(ServerConfig::default().port, 0);
    }

    #[test]
    fn default_token_env_is_namespaced() {
        assert_eq!(ServerConfig::default().api_token_env, "SA_CIRCLE_API_TOKEN");
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: ServerConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.port, 8910);
    }
}
