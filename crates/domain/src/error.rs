/// Shared error type used across all circle crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("llm provider {provider}: {message}")]
    Llm { provider: String, message: String },

    #[error("config: {0}")]
    Config(String),

    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("unknown persona: {0}")]
    UnknownPersona(String),

    #[error("invalid transition from {from} via {op}")]
    InvalidTransition { from: String, op: String },

    #[error("human protocol: {0}")]
    HumanProtocol(String),

    #[error("analysis: {0}")]
    Analysis(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
