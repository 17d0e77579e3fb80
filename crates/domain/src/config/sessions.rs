use serde::{Deserialize, Serialize};

fn d_state_dir() -> String {
    "./sessions".to_string()
}

fn d_event_bus_capacity() -> usize {
    256
}

fn d_keepalive_secs() -> u64 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    #[serde(default = "d_state_dir")]
    pub state_dir: String,
    #[serde(default = "d_event_bus_capacity")]
    pub event_bus_capacity: usize,
    #[serde(default = "d_keepalive_secs")]
    pub keepalive_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            state_dir: d_state_dir(),
            event_bus_capacity: d_event_bus_capacity(),
            keepalive_secs: d_keepalive_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_dir_is_relative() {
        assert_eq!(SessionsConfig::default().state_dir, "./sessions");
    }

    #[test]
    fn default_keepalive_matches_spec() {
        assert_eq!(SessionsConfig::default().keepalive_secs, 5);
    }
}
