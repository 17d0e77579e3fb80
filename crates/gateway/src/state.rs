use std::sync::Arc;

use circle_domain::config::Config;
use circle_llm::{EmbeddingClient, LlmClient, WarmthManager};
use circle_sessions::PersonaStore;

use crate::runtime::session::SessionRegistry;

/// Shared application state passed to all API handlers (§2 component 12,
/// "ServerContext"). Constructed once at startup and cloned cheaply into
/// every request handler.
///
/// Fields are grouped by concern:
/// - **Core services** — config, the persona catalog, LLM/embedding adapters
/// - **Runtime** — the session registry and the warmth manager
/// - **Security** — the API bearer-token hash computed once at startup
#[derive(Clone)]
pub struct AppState {
    // ── Core services ────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub personas: Arc<PersonaStore>,
    pub llm: Arc<dyn LlmClient>,
    pub embeddings: Arc<dyn EmbeddingClient>,

    // ── Runtime ───────────────────────────────────────────────────────
    pub sessions: Arc<SessionRegistry>,
    pub warmth: Arc<WarmthManager>,

    // ── Security (startup-computed) ──────────────────────────────────
    /// SHA-256 hash of the API bearer token (read once at startup).
    /// `None` = dev mode (no auth enforced).
    pub api_token_hash: Option<Vec<u8>>,
}
