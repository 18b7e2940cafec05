//! The orchestrating core: `ensure_collection`, `upsert`, `search`,
//! `list`, `delete`, `validate_model`, built against the [`VectorStore`] /
//! `EmbeddingClient` capability traits instead of a concrete Qdrant
//! client, with collaborators injected as `Arc<dyn Trait>` so either can
//! be swapped for a fake in tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use memory_embed::EmbeddingClient;
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use crate::cursor::CursorCodec;
use crate::error::{MemoryError, Result};
use crate::lock_table::LockTable;
use crate::model::{deduped_id, now_rfc3339, sentinel_id, IdStrategy, MemoryRecord, SearchHit, SCHEMA_VERSION};
use crate::vector_store::{PayloadIndexSchema, UpsertPoint, VectorStore};

/// Knobs the store needs beyond its two collaborators. Everything here
/// has a sensible default; `memory-server::config` is the only place
/// that reads the environment.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub collection_name: String,
    pub embed_model: String,
    pub lock_table_maxsize: usize,
    pub collection_cache_ttl: Duration,
    pub cursor_secret: Vec<u8>,
}

impl StoreConfig {
    pub fn new(collection_name: impl Into<String>, embed_model: impl Into<String>, cursor_secret: impl Into<Vec<u8>>) -> Self {
        Self {
            collection_name: collection_name.into(),
            embed_model: embed_model.into(),
            lock_table_maxsize: 1000,
            collection_cache_ttl: Duration::from_secs(30),
            cursor_secret: cursor_secret.into(),
        }
    }
}

/// Inputs to a single write, shared by `/memory` and each `/ingest` item.
#[derive(Debug, Clone)]
pub struct UpsertInput {
    pub text: String,
    pub tags: Vec<String>,
    pub source: String,
    pub dedupe_key: Option<String>,
    pub external_id: Option<String>,
}

/// Tracks only positive observations of collection existence, with a TTL.
/// Any negative signal just lets the next call re-check live — there is
/// nothing cached to invalidate in that case.
struct ExistsCache {
    last_true_at: Mutex<Option<Instant>>,
    ttl: Duration,
}

impl ExistsCache {
    fn new(ttl: Duration) -> Self {
        Self { last_true_at: Mutex::new(None), ttl }
    }

    fn is_fresh(&self) -> bool {
        self.last_true_at.lock().map(|t| t.elapsed() < self.ttl).unwrap_or(false)
    }

    fn mark_true(&self) {
        *self.last_true_at.lock() = Some(Instant::now());
    }

    fn invalidate(&self) {
        *self.last_true_at.lock() = None;
    }
}

/// The memory store core. Holds both collaborators behind trait objects
/// plus the small amount of process-local state that belongs at this
/// layer: the existence cache, the per-dedupe-key lock table, and the
/// cursor codec.
pub struct MemoryStore {
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingClient>,
    config: StoreConfig,
    exists_cache: ExistsCache,
    lock_table: LockTable,
    cursor_codec: CursorCodec,
}

impl MemoryStore {
    pub fn new(vector_store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingClient>, config: StoreConfig) -> Self {
        let cursor_codec = CursorCodec::new(config.cursor_secret.clone());
        let lock_table = LockTable::new(config.lock_table_maxsize);
        let exists_cache = ExistsCache::new(config.collection_cache_ttl);
        Self {
            vector_store,
            embedder,
            config,
            exists_cache,
            lock_table,
            cursor_codec,
        }
    }

    fn collection_name(&self) -> &str {
        &self.config.collection_name
    }

    /// §4.5.3's cache: a fresh positive observation short-circuits the
    /// round trip to the engine; anything else re-checks live and updates
    /// the cache accordingly.
    pub async fn collection_exists(&self) -> Result<bool> {
        if self.exists_cache.is_fresh() {
            return Ok(true);
        }
        match self.vector_store.collection_exists(self.collection_name()).await {
            Ok(true) => {
                self.exists_cache.mark_true();
                Ok(true)
            }
            Ok(false) => {
                self.exists_cache.invalidate();
                Ok(false)
            }
            Err(e) => {
                self.exists_cache.invalidate();
                Err(e)
            }
        }
    }

    /// Creates the collection (with its payload indexes and sentinel
    /// point) on first write. Two concurrent first-writers can both
    /// observe "does not exist" and both attempt creation; the underlying
    /// store is the source of truth for that race, so no lock guards this
    /// path.
    pub async fn ensure_collection(&self) -> Result<()> {
        if self.collection_exists().await? {
            return Ok(());
        }

        let dim = self
            .embedder
            .probe_dimension()
            .await
            .map_err(|e| MemoryError::EmbeddingUnavailable(e.to_string()))?;

        self.vector_store.create_collection(self.collection_name(), dim).await?;

        for field in ["dedupe_key", "tags", "source"] {
            if let Err(e) = self
                .vector_store
                .create_payload_index(self.collection_name(), field, PayloadIndexSchema::Keyword)
                .await
            {
                tracing::warn!(field, error = %e, "failed to create payload index; continuing without it");
            }
        }
        if let Err(e) = self
            .vector_store
            .create_payload_index(self.collection_name(), "written_at", PayloadIndexSchema::Datetime)
            .await
        {
            tracing::warn!(error = %e, "failed to create written_at payload index; continuing without it");
        }

        let sentinel = UpsertPoint {
            id: sentinel_id().to_string(),
            vector: vec![0.0; dim],
            payload: json!({
                "schema_version": SCHEMA_VERSION,
                "_meta": true,
                "model": self.config.embed_model,
                "dim": dim,
            }),
        };
        self.vector_store.upsert(self.collection_name(), vec![sentinel]).await?;

        self.exists_cache.mark_true();
        Ok(())
    }

    /// Startup-only check (§4.5.3). Callers decide what to do with
    /// `Err(MemoryError::ModelMismatch { .. })` (fatal) versus other
    /// errors (warn and continue, matching the reference's outer
    /// `except QdrantConnectionError` at the call site).
    pub async fn validate_model(&self) -> Result<()> {
        let id = sentinel_id().to_string();
        let points = self.vector_store.retrieve(self.collection_name(), &[id]).await?;

        let Some(point) = points.into_iter().next() else {
            tracing::warn!(
                collection = self.collection_name(),
                "collection has no model metadata (pre-versioned or externally created); proceeding"
            );
            return Ok(());
        };

        if point.payload.get("_meta").and_then(JsonValue::as_bool) != Some(true) {
            tracing::warn!("metadata point found but _meta flag is missing; proceeding");
            return Ok(());
        }

        let Some(stored_model) = point.payload.get("model").and_then(JsonValue::as_str) else {
            tracing::warn!("no model stored in collection metadata; proceeding");
            return Ok(());
        };
        let stored_dim = point.payload.get("dim").and_then(JsonValue::as_u64).map(|d| d as usize);

        let current_dim = match self.embedder.probe_dimension().await {
            Ok(d) => d,
            Err(_) => {
                tracing::warn!("cannot probe embedding dimension for model validation; skipping");
                return Ok(());
            }
        };

        if stored_model != self.config.embed_model || stored_dim != Some(current_dim) {
            return Err(MemoryError::ModelMismatch {
                stored_model: stored_model.to_string(),
                stored_dim: stored_dim.unwrap_or(0),
                current_model: self.config.embed_model.clone(),
                current_dim,
            });
        }
        Ok(())
    }

    /// §4.5.2. Returns `(id, id_strategy)`.
    pub async fn upsert(&self, input: UpsertInput) -> Result<(String, IdStrategy)> {
        self.ensure_collection().await?;
        let now = now_rfc3339();

        match input.dedupe_key.clone() {
            None => {
                let id = Uuid::new_v4().to_string();
                let vector = self
                    .embedder
                    .embed(&input.text)
                    .await
                    .map_err(|e| MemoryError::EmbeddingUnavailable(e.to_string()))?;
                let payload = record_payload(&input, &now, &now);
                self.vector_store
                    .upsert(self.collection_name(), vec![UpsertPoint { id: id.clone(), vector, payload }])
                    .await?;
                Ok((id, IdStrategy::Random))
            }
            Some(dedupe_key) => {
                let id = deduped_id(&dedupe_key).to_string();
                let lock = self.lock_table.get_or_create(&dedupe_key);
                let _guard = lock.lock().await;

                // A transport failure here is treated as "not found" —
                // the write must not abort because we couldn't read back
                // the previous state (§4.5.2 step 4a).
                let existing = self.vector_store.retrieve(self.collection_name(), &[id.clone()]).await;
                let (first_written_at, strategy) = match existing {
                    Ok(points) if !points.is_empty() => {
                        let first_written_at = points[0]
                            .payload
                            .get("first_written_at")
                            .and_then(JsonValue::as_str)
                            .map(str::to_string)
                            .unwrap_or_else(|| now.clone());
                        (first_written_at, IdStrategy::Deduped)
                    }
                    _ => (now.clone(), IdStrategy::Random),
                };

                let vector = self
                    .embedder
                    .embed(&input.text)
                    .await
                    .map_err(|e| MemoryError::EmbeddingUnavailable(e.to_string()))?;
                let payload = record_payload(&input, &now, &first_written_at);
                self.vector_store
                    .upsert(self.collection_name(), vec![UpsertPoint { id: id.clone(), vector, payload }])
                    .await?;
                Ok((id, strategy))
            }
        }
    }

    /// §4.5.4.
    pub async fn search(&self, query: &str, top_k: usize, include_text: bool) -> Result<Vec<SearchHit>> {
        if !self.collection_exists().await? {
            return Ok(Vec::new());
        }

        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| MemoryError::EmbeddingUnavailable(e.to_string()))?;

        let hits = match self.vector_store.search(self.collection_name(), vector, top_k, true).await {
            Ok(hits) => hits,
            Err(e) if is_not_found(&e) => {
                self.exists_cache.invalidate();
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        Ok(hits
            .into_iter()
            .map(|hit| SearchHit {
                id: hit.id,
                score: hit.score,
                tags: string_array(&hit.payload, "tags"),
                source: string_field(&hit.payload, "source"),
                written_at: string_field(&hit.payload, "written_at"),
                text: include_text.then(|| string_field(&hit.payload, "text")),
            })
            .collect())
    }

    /// §4.5.5. Returns `(memories, next_cursor)`.
    pub async fn list(&self, limit: usize, cursor: Option<&str>) -> Result<(Vec<MemoryRecord>, Option<String>)> {
        let offset = match cursor {
            Some(c) => Some(self.cursor_codec.decode(c)?),
            None => None,
        };

        if !self.collection_exists().await? {
            return Ok((Vec::new(), None));
        }

        let page = match self.vector_store.scroll(self.collection_name(), limit, offset, true).await {
            Ok(page) => page,
            Err(e) if is_not_found(&e) => {
                self.exists_cache.invalidate();
                return Ok((Vec::new(), None));
            }
            Err(e) => return Err(e),
        };

        let memories = page.points.into_iter().map(|p| record_from_payload(p.id, &p.payload)).collect();
        let next_cursor = match page.next_offset {
            Some(offset) => Some(self.cursor_codec.encode(&offset)?),
            None => None,
        };
        Ok((memories, next_cursor))
    }

    /// §4.5.6.
    pub async fn delete(&self, id: &str) -> Result<()> {
        if !self.collection_exists().await? {
            return Err(MemoryError::NotFound(format!("memory {id} not found")));
        }

        let points = match self.vector_store.retrieve(self.collection_name(), &[id.to_string()]).await {
            Ok(points) => points,
            Err(e) if is_not_found(&e) => {
                self.exists_cache.invalidate();
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        if points.is_empty() {
            return Err(MemoryError::NotFound(format!("memory {id} not found")));
        }

        self.vector_store.delete(self.collection_name(), &[id.to_string()]).await?;
        Ok(())
    }

    /// Liveness probes for the façade's `/health` endpoint (§6). Neither
    /// collaborator is otherwise exposed outside the store.
    pub async fn vector_store_available(&self) -> bool {
        self.vector_store.is_available().await
    }

    pub async fn embedder_available(&self, timeout: Duration) -> Option<bool> {
        self.embedder.is_available(timeout).await
    }
}

/// The real adapters fold "collection/point not found" into
/// `VectorStoreUnavailable` with engine-specific wording; the core
/// pattern-matches that wording back out rather than adding a dedicated
/// not-found variant to the vector-store error surface.
fn is_not_found(err: &MemoryError) -> bool {
    matches!(err, MemoryError::VectorStoreUnavailable(msg) if msg.to_lowercase().contains("not found"))
}

fn record_payload(input: &UpsertInput, written_at: &str, first_written_at: &str) -> JsonValue {
    json!({
        "schema_version": SCHEMA_VERSION,
        "text": input.text,
        "tags": input.tags,
        "source": input.source,
        "dedupe_key": input.dedupe_key,
        "external_id": input.external_id,
        "written_at": written_at,
        "first_written_at": first_written_at,
    })
}

fn string_field(payload: &JsonValue, field: &str) -> String {
    payload.get(field).and_then(JsonValue::as_str).unwrap_or_default().to_string()
}

fn string_array(payload: &JsonValue, field: &str) -> Vec<String> {
    payload
        .get(field)
        .and_then(JsonValue::as_array)
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn record_from_payload(id: String, payload: &JsonValue) -> MemoryRecord {
    MemoryRecord {
        id,
        text: string_field(payload, "text"),
        tags: string_array(payload, "tags"),
        source: string_field(payload, "source"),
        written_at: string_field(payload, "written_at"),
        first_written_at: string_field(payload, "first_written_at"),
        dedupe_key: payload.get("dedupe_key").and_then(JsonValue::as_str).map(str::to_string),
        external_id: payload.get("external_id").and_then(JsonValue::as_str).map(str::to_string),
    }
}

#[cfg(all(test, feature = "test-util"))]
mod tests {
    use super::*;
    use crate::vector_store::fake::FakeVectorStore;
    use memory_embed::fake::FakeEmbeddingClient;

    fn store() -> MemoryStore {
        let vs = Arc::new(FakeVectorStore::new());
        let embed = Arc::new(FakeEmbeddingClient::new());
        let config = StoreConfig::new("memories", "nomic-embed-text", b"test-secret".to_vec());
        MemoryStore::new(vs, embed, config)
    }

    #[tokio::test]
    async fn first_write_without_dedupe_key_is_random() {
        let store = store();
        let (_id, strategy) = store
            .upsert(UpsertInput {
                text: "hello".into(),
                tags: vec![],
                source: "test".into(),
                dedupe_key: None,
                external_id: None,
            })
            .await
            .unwrap();
        assert_eq!(strategy, IdStrategy::Random);
    }

    #[tokio::test]
    async fn dedupe_key_reuses_id_and_reports_deduped_on_second_write() {
        let store = store();
        let input = |text: &str| UpsertInput {
            text: text.into(),
            tags: vec![],
            source: "test".into(),
            dedupe_key: Some("k1".into()),
            external_id: None,
        };

        let (id1, strategy1) = store.upsert(input("first")).await.unwrap();
        assert_eq!(strategy1, IdStrategy::Random);

        let (id2, strategy2) = store.upsert(input("second")).await.unwrap();
        assert_eq!(id1, id2);
        assert_eq!(strategy2, IdStrategy::Deduped);

        let (memories, _) = store.list(10, None).await.unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].text, "second");
        assert!(memories[0].first_written_at <= memories[0].written_at);
    }

    #[tokio::test]
    async fn third_write_without_key_never_reuses_the_deduped_id() {
        let store = store();
        let (id1, _) = store
            .upsert(UpsertInput {
                text: "a".into(),
                tags: vec![],
                source: "t".into(),
                dedupe_key: Some("k".into()),
                external_id: None,
            })
            .await
            .unwrap();
        let (id2, _) = store
            .upsert(UpsertInput { text: "b".into(), tags: vec![], source: "t".into(), dedupe_key: None, external_id: None })
            .await
            .unwrap();
        assert_ne!(id1, id2);
    }

    #[tokio::test]
    async fn empty_collection_search_does_not_call_embedder() {
        let vs = Arc::new(FakeVectorStore::new());
        let embed = Arc::new(FakeEmbeddingClient::new());
        let config = StoreConfig::new("memories", "nomic-embed-text", b"test-secret".to_vec());
        let store = MemoryStore::new(vs, embed.clone(), config);

        let hits = store.search("fox", 5, true).await.unwrap();
        assert!(hits.is_empty());
        assert_eq!(embed.call_count(), 0);

        let (memories, cursor) = store.list(10, None).await.unwrap();
        assert!(memories.is_empty());
        assert!(cursor.is_none());
    }

    #[tokio::test]
    async fn search_roundtrip_finds_written_text() {
        let store = store();
        store
            .upsert(UpsertInput {
                text: "the quick brown fox".into(),
                tags: vec![],
                source: "test".into(),
                dedupe_key: None,
                external_id: None,
            })
            .await
            .unwrap();

        let hits = store.search("the quick brown fox", 5, true).await.unwrap();
        assert!(!hits.is_empty());
        assert_eq!(hits[0].text.as_deref(), Some("the quick brown fox"));
    }

    #[tokio::test]
    async fn search_omits_text_when_not_requested() {
        let store = store();
        store
            .upsert(UpsertInput { text: "fox".into(), tags: vec![], source: "t".into(), dedupe_key: None, external_id: None })
            .await
            .unwrap();
        let hits = store.search("fox", 5, false).await.unwrap();
        assert_eq!(hits[0].text, None);
    }

    #[tokio::test]
    async fn pagination_pages_do_not_overlap() {
        let store = store();
        for i in 0..5 {
            store
                .upsert(UpsertInput {
                    text: format!("memory {i}"),
                    tags: vec![],
                    source: "t".into(),
                    dedupe_key: None,
                    external_id: None,
                })
                .await
                .unwrap();
        }

        let (page1, cursor1) = store.list(2, None).await.unwrap();
        assert_eq!(page1.len(), 2);
        let cursor1 = cursor1.expect("more pages remain");

        let (page2, _) = store.list(2, Some(&cursor1)).await.unwrap();
        assert_eq!(page2.len(), 2);

        let ids1: Vec<_> = page1.iter().map(|m| m.id.clone()).collect();
        assert!(page2.iter().all(|m| !ids1.contains(&m.id)));
    }

    #[tokio::test]
    async fn tampered_cursor_is_rejected() {
        let store = store();
        store
            .upsert(UpsertInput { text: "a".into(), tags: vec![], source: "t".into(), dedupe_key: None, external_id: None })
            .await
            .unwrap();
        store
            .upsert(UpsertInput { text: "b".into(), tags: vec![], source: "t".into(), dedupe_key: None, external_id: None })
            .await
            .unwrap();

        let (_, cursor) = store.list(1, None).await.unwrap();
        let mut tampered = cursor.unwrap();
        tampered.push('z');

        let err = store.list(1, Some(&tampered)).await.unwrap_err();
        assert!(matches!(err, MemoryError::InvalidCursor));
    }

    #[tokio::test]
    async fn delete_then_redelete_is_not_found() {
        let store = store();
        let (id, _) = store
            .upsert(UpsertInput { text: "a".into(), tags: vec![], source: "t".into(), dedupe_key: None, external_id: None })
            .await
            .unwrap();

        store.delete(&id).await.unwrap();
        assert!(matches!(store.delete(&id).await, Err(MemoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_against_empty_collection_is_not_found() {
        let store = store();
        assert!(matches!(
            store.delete(&Uuid::new_v4().to_string()).await,
            Err(MemoryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn sentinel_never_surfaces_in_list_or_search() {
        let store = store();
        store
            .upsert(UpsertInput { text: "a".into(), tags: vec![], source: "t".into(), dedupe_key: None, external_id: None })
            .await
            .unwrap();

        let (memories, _) = store.list(50, None).await.unwrap();
        assert!(memories.iter().all(|m| m.text != ""));

        let hits = store.search("a", 50, true).await.unwrap();
        assert_eq!(hits.len(), 1);
    }
}
