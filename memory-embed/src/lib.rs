//! Embedding client: turns text into a fixed-length vector of floats by
//! calling a remote embedding service, auto-detecting which of two known
//! Ollama request-path conventions the server accepts and pinning the
//! first one that succeeds for the process lifetime. Try the default,
//! fall back to the other candidate, never re-detect once something has
//! worked.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;

/// Newer Ollama embedding path, tried first by default.
pub const EMBED_PATH: &str = "/api/embed";
/// Older Ollama embedding path, the fallback candidate.
pub const EMBEDDINGS_PATH: &str = "/api/embeddings";

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("{0}")]
    Unavailable(String),
}

/// Capability surface the memory store depends on. `OllamaEmbeddingClient`
/// is the production implementation; `fake::FakeEmbeddingClient` (behind
/// `test-util`) is the in-memory one used by the façade's integration
/// tests.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Calls `embed("probe")` once, caching and returning the resulting
    /// length. Never re-probes after a successful call.
    async fn probe_dimension(&self) -> Result<usize, EmbedError>;

    /// Bounded liveness probe. Must never panic: every branch returns a
    /// value. `Some(true)`/`Some(false)` are definite; `None` means the
    /// probe timed out and availability is unknown.
    async fn is_available(&self, timeout: Duration) -> Option<bool>;
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EmbedResponse {
    Batch { embeddings: Vec<Vec<f32>> },
    Single { embedding: Vec<f32> },
}

fn other_path(preferred: &str) -> &'static str {
    if preferred == EMBED_PATH {
        EMBEDDINGS_PATH
    } else {
        EMBED_PATH
    }
}

/// Ollama-backed embedding client. Holds one `reqwest::Client`,
/// constructed once at startup and shared across requests via the
/// process's app state.
pub struct OllamaEmbeddingClient {
    client: reqwest::Client,
    base_url: String,
    model: String,
    preferred_path: String,
    fallback_path: &'static str,
    pinned_path: OnceCell<String>,
    dimension: OnceCell<usize>,
}

impl OllamaEmbeddingClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, preferred_path: impl Into<String>) -> Self {
        let preferred_path = preferred_path.into();
        let fallback_path = other_path(&preferred_path);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("static client config never fails to build");
        Self {
            client,
            base_url: base_url.into(),
            model: model.into(),
            preferred_path,
            fallback_path,
            pinned_path: OnceCell::new(),
            dimension: OnceCell::new(),
        }
    }

    async fn embed_via(&self, path: &str, text: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}{path}", self.base_url.trim_end_matches('/'));
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest { model: &self.model, input: text })
            .send()
            .await
            .map_err(|e| EmbedError::Unavailable(format!("request to {path} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(EmbedError::Unavailable(format!("{path} returned {status}")));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::Unavailable(format!("unrecognised response shape from {path}: {e}")))?;

        match body {
            EmbedResponse::Batch { mut embeddings } if !embeddings.is_empty() => Ok(embeddings.remove(0)),
            EmbedResponse::Single { embedding } => Ok(embedding),
            _ => Err(EmbedError::Unavailable(format!("empty embeddings array from {path}"))),
        }
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if let Some(path) = self.pinned_path.get() {
            return self.embed_via(path, text).await;
        }

        match self.embed_via(&self.preferred_path, text).await {
            Ok(v) => {
                let _ = self.pinned_path.set(self.preferred_path.clone());
                Ok(v)
            }
            Err(preferred_err) => match self.embed_via(self.fallback_path, text).await {
                Ok(v) => {
                    let _ = self.pinned_path.set(self.fallback_path.to_string());
                    Ok(v)
                }
                Err(_) => Err(preferred_err),
            },
        }
    }

    async fn probe_dimension(&self) -> Result<usize, EmbedError> {
        if let Some(dim) = self.dimension.get() {
            return Ok(*dim);
        }
        let vector = self.embed("probe").await?;
        let dim = vector.len();
        let _ = self.dimension.set(dim);
        Ok(dim)
    }

    async fn is_available(&self, timeout: Duration) -> Option<bool> {
        match tokio::time::timeout(timeout, self.embed("healthcheck")).await {
            Ok(Ok(_)) => Some(true),
            Ok(Err(_)) => Some(false),
            Err(_) => None,
        }
    }
}

#[cfg(feature = "test-util")]
pub mod fake;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn other_path_is_the_complement() {
        assert_eq!(other_path(EMBED_PATH), EMBEDDINGS_PATH);
        assert_eq!(other_path(EMBEDDINGS_PATH), EMBED_PATH);
    }
}
