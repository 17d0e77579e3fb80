use async_trait::async_trait;
use circle_domain::Result;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// A provider-agnostic chat completion request; mirrors the wire contract
/// consumed from the backend at `<base>/api/chat` (§6.1).
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repeat_penalty: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
}

/// Thin adapter to the chat endpoint (§2 component 1). Implementations own
/// their own retry/backoff and liveness probing.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    /// Probes the backend's liveness/model-catalog endpoint.
    async fn is_running(&self) -> bool;

    /// Lists models the backend currently reports as available.
    async fn available_models(&self) -> Result<Vec<String>>;

    /// Issues a minimal one-token generation request to keep `model`
    /// resident in the backend's memory (§4.8).
    async fn warm_model(&self, model: &str) -> Result<()>;
}

/// Function from text to a unit-length float vector of fixed dimension
/// (§2 component 2). The embedding backend itself is out of scope; this
/// crate only defines the contract the rest of the engine consumes.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn dimension(&self) -> usize;
}
