pub mod embeddings;
pub mod ollama;
pub mod traits;
pub mod warmth;

pub use embeddings::HttpEmbeddingClient;
pub use ollama::OllamaClient;
pub use traits::{ChatMessage, ChatRequest, ChatResponse, ChatRole, EmbeddingClient, LlmClient};
pub use warmth::WarmthManager;
