//! The vector-store capability contract (§4.2) and its Qdrant-backed
//! implementation. The memory store only ever talks to `dyn VectorStore`,
//! so tests can swap in an in-memory fake without touching a live Qdrant
//! instance.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::{MemoryError, Result};

/// Schema hint for a payload index. Qdrant's index types are broader; the
/// core only ever needs these two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadIndexSchema {
    Keyword,
    Datetime,
}

/// A point to be written.
#[derive(Debug, Clone)]
pub struct UpsertPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: JsonValue,
}

/// A point read back, payload only (no vector) unless the adapter is asked
/// for vectors explicitly via `retrieve_with_vector`.
#[derive(Debug, Clone)]
pub struct RetrievedPoint {
    pub id: String,
    pub payload: JsonValue,
}

/// A similarity-search hit.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: JsonValue,
}

/// One page of a chronological scroll.
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    pub points: Vec<RetrievedPoint>,
    pub next_offset: Option<JsonValue>,
}

/// Capability surface the memory store depends on (§4.2). Any engine that
/// can fulfil this contract is a legal backend; `QdrantVectorStore` is the
/// production implementation, `fake::FakeVectorStore` (behind `test-util`)
/// is the in-memory one used by the façade's integration tests.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn collection_exists(&self, name: &str) -> Result<bool>;

    async fn create_collection(&self, name: &str, dim: usize) -> Result<()>;

    async fn create_payload_index(
        &self,
        name: &str,
        field: &str,
        schema: PayloadIndexSchema,
    ) -> Result<()>;

    async fn upsert(&self, name: &str, points: Vec<UpsertPoint>) -> Result<()>;

    /// Retrieve points by id. Never errors on "not found" — returns fewer
    /// points than ids were requested.
    async fn retrieve(&self, name: &str, ids: &[String]) -> Result<Vec<RetrievedPoint>>;

    /// `exclude_sentinel` bakes in the one filter shape the core ever
    /// needs (`_meta != true`) — a boolean rather than a generic filter
    /// expression, since no other filter is ever built.
    async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: usize,
        exclude_sentinel: bool,
    ) -> Result<Vec<SearchHit>>;

    /// Scroll ordered by `written_at` descending, continuing from `offset`
    /// if given.
    async fn scroll(
        &self,
        name: &str,
        limit: usize,
        offset: Option<JsonValue>,
        exclude_sentinel: bool,
    ) -> Result<ScrollPage>;

    async fn delete(&self, name: &str, ids: &[String]) -> Result<()>;

    /// Bounded liveness probe used by the health endpoint (§6). Must not
    /// error or panic — a failed probe is simply `false`.
    async fn is_available(&self) -> bool;

    /// Release any held connection. A default no-op: `qdrant-client`'s
    /// channel has no explicit async teardown, it closes on `Drop`, so
    /// the capability exists for symmetry with the contract without
    /// forcing every implementation to define one.
    async fn close(&self) {}
}

/// Maps a transport failure to `VectorStoreUnavailable`, the uniform shape
/// every adapter method uses for "couldn't reach the engine at all."
pub(crate) fn unavailable(context: &str, err: impl std::fmt::Display) -> MemoryError {
    MemoryError::VectorStoreUnavailable(format!("{context}: {err}"))
}

#[cfg(feature = "test-util")]
pub mod fake;
