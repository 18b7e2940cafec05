//! In-memory [`EmbeddingClient`] used by `memory-server`'s integration
//! tests so they can drive the full HTTP surface without a live Ollama
//! instance. Produces a deterministic vector from the text's bytes so
//! that searches over distinct inputs return distinguishable scores.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::{EmbedError, EmbeddingClient};

const FAKE_DIM: usize = 8;

/// Deterministic, dependency-free stand-in for a real embedding model:
/// hashes the text into a fixed-size float vector so cosine similarity
/// still distinguishes unrelated inputs in tests.
fn fake_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; FAKE_DIM];
    for (i, byte) in text.bytes().enumerate() {
        v[i % FAKE_DIM] += byte as f32;
    }
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
    v
}

pub struct FakeEmbeddingClient {
    unavailable: AtomicBool,
    dimension: OnceCell<usize>,
    call_count: AtomicUsize,
}

impl FakeEmbeddingClient {
    pub fn new() -> Self {
        Self {
            unavailable: AtomicBool::new(false),
            dimension: OnceCell::new(),
            call_count: AtomicUsize::new(0),
        }
    }

    /// Flip the fake into "unreachable" mode, for exercising the degraded
    /// façade paths without a live embedding service.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Default for FakeEmbeddingClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingClient for FakeEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EmbedError::Unavailable("fake embedder is offline".into()));
        }
        Ok(fake_vector(text))
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
        let _ = timeout;
        Some(!self.unavailable.load(Ordering::SeqCst))
    }
}
