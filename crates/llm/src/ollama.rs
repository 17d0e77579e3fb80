use std::time::Duration;

use async_trait::async_trait;
use circle_domain::{Error, Result};
use serde::Deserialize;
use serde_json::json;

use crate::traits::{ChatMessage, ChatRequest, ChatResponse, ChatRole, LlmClient};

/// Adapter to an Ollama-compatible chat backend (§6.1). Owns its own HTTP
/// client, retry/backoff, and liveness probing; callers never see a raw
/// `reqwest` error.
pub struct OllamaClient {
    base_url: String,
    http: reqwest::Client,
    max_retries: u32,
    liveness_timeout: Duration,
    warm_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    message: ChatResponseMessage,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagsModel>,
}

#[derive(Debug, Deserialize)]
struct TagsModel {
    name: String,
}

impl OllamaClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout_secs: u64,
        max_retries: u32,
        liveness_timeout_secs: u64,
        warm_timeout_secs: u64,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            max_retries,
            liveness_timeout: Duration::from_secs(liveness_timeout_secs),
            warm_timeout: Duration::from_secs(warm_timeout_secs),
        })
    }

    fn chat_body(req: &ChatRequest) -> serde_json::Value {
        let messages: Vec<serde_json::Value> = req
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    ChatRole::System => "system",
                    ChatRole::User => "user",
                    ChatRole::Assistant => "assistant",
                };
                json!({ "role": role, "content": m.content })
            })
            .collect();

        let mut options = json!({ "temperature": req.temperature });
        if let Some(seed) = req.seed {
            options["seed"] = json!(seed);
        }
        if let Some(top_p) = req.top_p {
            options["top_p"] = json!(top_p);
        }
        if let Some(rp) = req.repeat_penalty {
            options["repeat_penalty"] = json!(rp);
        }

        json!({
            "model": req.model,
            "messages": messages,
            "stream": false,
            "options": options,
        })
    }

    /// Issues one chat attempt with no retry; classifies the error as
    /// retryable or fatal on failure (§4.7).
    async fn chat_once(&self, req: &ChatRequest) -> std::result::Result<ChatResponse, RetryableError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = Self::chat_body(req);

        let resp = self.http.post(&url).json(&body).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                RetryableError::Retryable(e.to_string())
            } else {
                RetryableError::Fatal(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            if status.as_u16() == 408 || status.is_server_error() {
                return Err(RetryableError::Retryable(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    text
                )));
            }
            return Err(RetryableError::Fatal(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }

        let parsed: ChatResponseBody = resp
            .json()
            .await
            .map_err(|e| RetryableError::Fatal(e.to_string()))?;

        Ok(ChatResponse {
            content: parsed.message.content,
            prompt_tokens: parsed.prompt_eval_count,
            completion_tokens: parsed.eval_count,
        })
    }
}

enum RetryableError {
    Retryable(String),
    Fatal(String),
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let mut last_err = String::new();
        for attempt in 0..=self.max_retries {
            match self.chat_once(&req).await {
                Ok(resp) => return Ok(resp),
                Err(RetryableError::Fatal(msg)) => {
                    return Err(Error::Llm {
                        provider: "ollama".into(),
                        message: msg,
                    });
                }
                Err(RetryableError::Retryable(msg)) => {
                    last_err = msg;
                    if attempt < self.max_retries {
                        let backoff = Duration::from_secs(2u64.pow(attempt));
                        tracing::warn!(attempt, backoff_secs = backoff.as_secs(), error = %last_err, "ollama chat retrying");
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
        Err(Error::Llm {
            provider: "ollama".into(),
            message: format!("exhausted {} retries: {}", self.max_retries, last_err),
        })
    }

    async fn is_running(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self
            .http
            .get(&url)
            .timeout(self.liveness_timeout)
            .send()
            .await;
        matches!(resp, Ok(r) if r.status().is_success())
    }

    async fn available_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self
            .http
            .get(&url)
            .timeout(self.liveness_timeout)
            .send()
            .await
            .map_err(|e| Error::Timeout(e.to_string()))?;
        let parsed: TagsResponse = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    async fn warm_model(&self, model: &str) -> Result<()> {
        let url = format!("{}/api/generate", self.base_url);
        let body = json!({
            "model": model,
            "prompt": "",
            "stream": false,
            "options": { "num_predict": 1 },
        });
        self.http
            .post(&url)
            .json(&body)
            .timeout(self.warm_timeout)
            .send()
            .await
            .map_err(|e| Error::Timeout(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_body_includes_sampling_overrides() {
        let req = ChatRequest {
            model: "llama3".into(),
            messages: vec![ChatMessage {
                role: ChatRole::User,
                content: "hi".into(),
            }],
            temperature: 0.7,
            seed: Some(42),
            top_p: Some(0.9),
            repeat_penalty: Some(1.1),
        };
        let body = OllamaClient::chat_body(&req);
        assert_eq!(body["options"]["seed"], 42);
        assert_eq!(body["options"]["top_p"], 0.9);
        assert_eq!(body["stream"], false);
    }
}
