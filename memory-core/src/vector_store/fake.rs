//! In-memory `VectorStore` used by `memory-server`'s integration tests so
//! they can drive the full HTTP surface without a live Qdrant instance.
//! Mirrors the real adapter's externally-observable behaviour (sentinel
//! filtering, chronological scroll with offset continuation, cosine
//! similarity) closely enough for pagination, filtering, and ranking
//! properties to hold against it the same way they hold against Qdrant.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;

use super::{PayloadIndexSchema, RetrievedPoint, ScrollPage, SearchHit, UpsertPoint, VectorStore};
use crate::error::Result;

struct FakeCollection {
    dim: usize,
    points: HashMap<String, (Vec<f32>, JsonValue)>,
}

#[derive(Default)]
pub struct FakeVectorStore {
    collections: Mutex<HashMap<String, FakeCollection>>,
    unavailable: AtomicBool,
}

impl FakeVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flip the fake into "unreachable" mode, for exercising the degraded
    /// health-check path without a live Qdrant instance.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

fn is_sentinel(payload: &JsonValue) -> bool {
    payload.get("_meta").and_then(JsonValue::as_bool) == Some(true)
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    ((dot / (na * nb) + 1.0) / 2.0).clamp(0.0, 1.0)
}

#[async_trait]
impl VectorStore for FakeVectorStore {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        Ok(self.collections.lock().contains_key(name))
    }

    async fn create_collection(&self, name: &str, dim: usize) -> Result<()> {
        self.collections.lock().entry(name.to_string()).or_insert_with(|| FakeCollection {
            dim,
            points: HashMap::new(),
        });
        Ok(())
    }

    async fn create_payload_index(
        &self,
        _name: &str,
        _field: &str,
        _schema: PayloadIndexSchema,
    ) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<UpsertPoint>) -> Result<()> {
        let mut guard = self.collections.lock();
        let col = guard
            .entry(name.to_string())
            .or_insert_with(|| FakeCollection { dim: 0, points: HashMap::new() });
        for p in points {
            col.points.insert(p.id, (p.vector, p.payload));
        }
        Ok(())
    }

    async fn retrieve(&self, name: &str, ids: &[String]) -> Result<Vec<RetrievedPoint>> {
        let guard = self.collections.lock();
        let Some(col) = guard.get(name) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| {
                col.points.get(id).map(|(_, payload)| RetrievedPoint {
                    id: id.clone(),
                    payload: payload.clone(),
                })
            })
            .collect())
    }

    async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: usize,
        exclude_sentinel: bool,
    ) -> Result<Vec<SearchHit>> {
        let guard = self.collections.lock();
        let Some(col) = guard.get(name) else {
            return Ok(Vec::new());
        };
        let mut hits: Vec<SearchHit> = col
            .points
            .iter()
            .filter(|(_, (_, payload))| !(exclude_sentinel && is_sentinel(payload)))
            .map(|(id, (v, payload))| SearchHit {
                id: id.clone(),
                score: cosine(&vector, v),
                payload: payload.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn scroll(
        &self,
        name: &str,
        limit: usize,
        offset: Option<JsonValue>,
        exclude_sentinel: bool,
    ) -> Result<ScrollPage> {
        let guard = self.collections.lock();
        let Some(col) = guard.get(name) else {
            return Ok(ScrollPage::default());
        };

        let mut entries: Vec<(&String, &JsonValue)> = col
            .points
            .iter()
            .filter(|(_, (_, payload))| !(exclude_sentinel && is_sentinel(payload)))
            .map(|(id, (_, payload))| (id, payload))
            .collect();
        entries.sort_by(|a, b| {
            let wa = a.1.get("written_at").and_then(JsonValue::as_str).unwrap_or("");
            let wb = b.1.get("written_at").and_then(JsonValue::as_str).unwrap_or("");
            wb.cmp(wa).then_with(|| a.0.cmp(b.0))
        });

        let skip = offset
            .as_ref()
            .and_then(JsonValue::as_u64)
            .unwrap_or(0) as usize;

        let page: Vec<RetrievedPoint> = entries
            .iter()
            .skip(skip)
            .take(limit)
            .map(|(id, payload)| RetrievedPoint { id: (*id).clone(), payload: (*payload).clone() })
            .collect();

        let next_offset = if skip + page.len() < entries.len() {
            Some(JsonValue::from((skip + page.len()) as u64))
        } else {
            None
        };

        Ok(ScrollPage { points: page, next_offset })
    }

    async fn delete(&self, name: &str, ids: &[String]) -> Result<()> {
        if let Some(col) = self.collections.lock().get_mut(name) {
            for id in ids {
                col.points.remove(id);
            }
        }
        Ok(())
    }

    async fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }
}
