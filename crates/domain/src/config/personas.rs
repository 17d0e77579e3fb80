use serde::{Deserialize, Serialize};

fn d_templates_dir() -> String {
    "./personas/templates".to_string()
}

fn d_personas_dir() -> String {
    "./personas/agents".to_string()
}

/// Filesystem locations the Persona Store reads from at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaSourceConfig {
    #[serde(default = "d_templates_dir")]
    pub templates_dir: String,
    #[serde(default = "d_personas_dir")]
    pub personas_dir: String,
}

impl Default for PersonaSourceConfig {
    fn default() -> Self {
        Self {
            templates_dir: d_templates_dir(),
            personas_dir: d_personas_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_distinct_directories() {
        let cfg = PersonaSourceConfig::default();
        assert_ne!(cfg.templates_dir, cfg.personas_dir);
    }
}
