use async_trait::async_trait;
use circle_domain::{Error, Result};
use serde::Deserialize;
use serde_json::json;

use crate::traits::EmbeddingClient;

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Adapter to an external text-to-vector backend (§2 component 2). The
/// backend itself is out of scope (§1); this type only normalizes its
/// output to satisfy the unit-length embedding invariant (§3).
pub struct HttpEmbeddingClient {
    base_url: String,
    model: String,
    dimension: usize,
    http: reqwest::Client,
}

impl HttpEmbeddingClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, dimension: usize) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            dimension,
            http: reqwest::Client::new(),
        }
    }

    fn normalize(mut v: Vec<f32>) -> Vec<f32> {
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 1e-12 {
            for x in v.iter_mut() {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl EmbeddingClient for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = json!({ "model": self.model, "prompt": text });
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let parsed: EmbedResponse = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        let normalized = Self::normalize(parsed.embedding);
        if normalized.iter().all(|x| *x == 0.0) {
            return Err(Error::Analysis("embedding backend returned a zero vector".into()));
        }
        Ok(normalized)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_produces_unit_length_vector() {
        let v = HttpEmbeddingClient::normalize(vec![3.0, 4.0]);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn normalize_leaves_zero_vector_untouched() {
        let v = HttpEmbeddingClient::normalize(vec![0.0, 0.0]);
        assert_eq!(v, vec![0.0, 0.0]);
    }
}
