//! Qdrant-backed implementation of [`VectorStore`]: collection/upsert/
//! search/scroll call shapes, plus the filter idiom (`Condition::matches`,
//! payload-as-JSON round trip through `PointStruct::new`) used for
//! payload-filtered memory queries.

use std::collections::HashMap;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    point_id::PointIdOptions, points_selector::PointsSelectorOneOf, value::Kind,
    vectors_config::Config as VectorsConfigInner, Condition, CreateCollectionBuilder,
    CreateFieldIndexCollectionBuilder, DeletePointsBuilder, Direction, Distance, FieldType, Filter,
    GetPointsBuilder, ListValue, OrderBy, PointId, PointStruct, PointsIdsList, PointsSelector,
    ScrollPointsBuilder, SearchPointsBuilder, Struct as QdrantStruct, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder, VectorsConfig,
};
use qdrant_client::Qdrant;
use serde_json::Value as JsonValue;

use crate::error::MemoryError;
use crate::vector_store::{
    unavailable, PayloadIndexSchema, RetrievedPoint, ScrollPage, SearchHit, UpsertPoint,
    VectorStore,
};

pub struct QdrantVectorStore {
    client: Qdrant,
}

impl QdrantVectorStore {
    pub fn connect(url: &str) -> Result<Self, MemoryError> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| unavailable("failed to construct Qdrant client", e))?;
        Ok(Self { client })
    }

}

fn point_id_to_string(id: PointId) -> Option<String> {
    match id.point_id_options? {
        PointIdOptions::Num(n) => Some(n.to_string()),
        PointIdOptions::Uuid(u) => Some(u),
    }
}

/// Converts a JSON scalar/array/object into the protobuf-oneof shape Qdrant
/// stores payload fields as. Mirrors `vector_kb::qdrant_backend`'s
/// per-field `QdrantValue::from(...)` idiom, generalized to walk an
/// arbitrary `serde_json::Value` so callers don't hand-build the map.
fn json_to_qdrant_value(value: &JsonValue) -> QdrantValue {
    let kind = match value {
        JsonValue::Null => Kind::NullValue(0),
        JsonValue::Bool(b) => Kind::BoolValue(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Kind::IntegerValue(i),
            None => Kind::DoubleValue(n.as_f64().unwrap_or_default()),
        },
        JsonValue::String(s) => Kind::StringValue(s.clone()),
        JsonValue::Array(items) => Kind::ListValue(ListValue {
            values: items.iter().map(json_to_qdrant_value).collect(),
        }),
        JsonValue::Object(map) => Kind::StructValue(QdrantStruct {
            fields: map
                .iter()
                .map(|(k, v)| (k.clone(), json_to_qdrant_value(v)))
                .collect(),
        }),
    };
    QdrantValue { kind: Some(kind) }
}

/// Inverse of [`json_to_qdrant_value`]: reads a Qdrant payload value via its
/// `Kind` oneof, per `vector_kb::qdrant_backend`'s `.as_str()` read path
/// (generalized here to cover every `Kind` variant, not just strings).
fn qdrant_value_to_json(value: &QdrantValue) -> JsonValue {
    match value.kind.as_ref() {
        None | Some(Kind::NullValue(_)) => JsonValue::Null,
        Some(Kind::BoolValue(b)) => JsonValue::Bool(*b),
        Some(Kind::IntegerValue(i)) => JsonValue::Number((*i).into()),
        Some(Kind::DoubleValue(d)) => {
            serde_json::Number::from_f64(*d).map(JsonValue::Number).unwrap_or(JsonValue::Null)
        }
        Some(Kind::StringValue(s)) => JsonValue::String(s.clone()),
        Some(Kind::ListValue(list)) => {
            JsonValue::Array(list.values.iter().map(qdrant_value_to_json).collect())
        }
        Some(Kind::StructValue(s)) => JsonValue::Object(
            s.fields.iter().map(|(k, v)| (k.clone(), qdrant_value_to_json(v))).collect(),
        ),
    }
}

fn json_to_payload(value: &JsonValue) -> HashMap<String, QdrantValue> {
    match value.as_object() {
        Some(map) => map.iter().map(|(k, v)| (k.clone(), json_to_qdrant_value(v))).collect(),
        None => HashMap::new(),
    }
}

fn payload_to_json(payload: &HashMap<String, QdrantValue>) -> JsonValue {
    JsonValue::Object(
        payload.iter().map(|(k, v)| (k.clone(), qdrant_value_to_json(v))).collect(),
    )
}

fn sentinel_exclusion_filter() -> Filter {
    Filter {
        must_not: vec![Condition::matches("_meta", true)],
        ..Default::default()
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn collection_exists(&self, name: &str) -> crate::error::Result<bool> {
        self.client
            .collection_exists(name)
            .await
            .map_err(|e| unavailable("collection_exists", e))
    }

    async fn create_collection(&self, name: &str, dim: usize) -> crate::error::Result<()> {
        let create = CreateCollectionBuilder::new(name.to_string())
            .vectors_config(VectorsConfig {
                config: Some(VectorsConfigInner::Params(
                    VectorParamsBuilder::new(dim as u64, Distance::Cosine).build(),
                )),
            })
            .on_disk_payload(false);

        self.client
            .create_collection(create)
            .await
            .map_err(|e| unavailable("create_collection", e))?;
        Ok(())
    }

    async fn create_payload_index(
        &self,
        name: &str,
        field: &str,
        schema: PayloadIndexSchema,
    ) -> crate::error::Result<()> {
        let field_type = match schema {
            PayloadIndexSchema::Keyword => FieldType::Keyword,
            PayloadIndexSchema::Datetime => FieldType::Datetime,
        };
        self.client
            .create_field_index(CreateFieldIndexCollectionBuilder::new(
                name.to_string(),
                field.to_string(),
                field_type,
            ))
            .await
            .map_err(|e| unavailable("create_payload_index", e))?;
        Ok(())
    }

    async fn upsert(&self, name: &str, points: Vec<UpsertPoint>) -> crate::error::Result<()> {
        let points: Vec<PointStruct> = points
            .into_iter()
            .map(|p| PointStruct::new(p.id, p.vector, json_to_payload(&p.payload)))
            .collect();
        self.client
            .upsert_points(UpsertPointsBuilder::new(name, points))
            .await
            .map_err(|e| unavailable("upsert", e))?;
        Ok(())
    }

    async fn retrieve(&self, name: &str, ids: &[String]) -> crate::error::Result<Vec<RetrievedPoint>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let point_ids: Vec<PointId> = ids.iter().map(|id| id.clone().into()).collect();
        let response = self
            .client
            .get_points(GetPointsBuilder::new(name, point_ids).with_payload(true))
            .await
            .map_err(|e| unavailable("retrieve", e))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|p| {
                let id = point_id_to_string(p.id?)?;
                Some(RetrievedPoint { id, payload: payload_to_json(&p.payload) })
            })
            .collect())
    }

    async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: usize,
        exclude_sentinel: bool,
    ) -> crate::error::Result<Vec<SearchHit>> {
        let mut search = SearchPointsBuilder::new(name, vector, limit as u64).with_payload(true);
        if exclude_sentinel {
            search = search.filter(sentinel_exclusion_filter());
        }

        let response = self
            .client
            .search_points(search)
            .await
            .map_err(|e| unavailable("search", e))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|p| {
                let id = point_id_to_string(p.id?)?;
                Some(SearchHit { id, score: p.score, payload: payload_to_json(&p.payload) })
            })
            .collect())
    }

    async fn scroll(
        &self,
        name: &str,
        limit: usize,
        offset: Option<JsonValue>,
        exclude_sentinel: bool,
    ) -> crate::error::Result<ScrollPage> {
        let mut scroll = ScrollPointsBuilder::new(name)
            .limit(limit as u32)
            .with_payload(true)
            .order_by(OrderBy {
                key: "written_at".to_string(),
                direction: Some(Direction::Desc.into()),
                start_from: None,
            });

        if exclude_sentinel {
            scroll = scroll.filter(sentinel_exclusion_filter());
        }
        if let Some(offset) = offset.as_ref().and_then(JsonValue::as_str) {
            scroll = scroll.offset(PointId::from(offset.to_string()));
        }

        let response = self
            .client
            .scroll(scroll)
            .await
            .map_err(|e| unavailable("scroll", e))?;

        let points = response
            .result
            .into_iter()
            .filter_map(|p| {
                let id = point_id_to_string(p.id?)?;
                Some(RetrievedPoint { id, payload: payload_to_json(&p.payload) })
            })
            .collect();

        let next_offset = response
            .next_page_offset
            .and_then(point_id_to_string)
            .map(JsonValue::from);

        Ok(ScrollPage { points, next_offset })
    }

    async fn delete(&self, name: &str, ids: &[String]) -> crate::error::Result<()> {
        let selector = PointsSelector {
            points_selector_one_of: Some(PointsSelectorOneOf::Points(PointsIdsList {
                ids: ids.iter().map(|id| id.clone().into()).collect(),
            })),
        };
        self.client
            .delete_points(DeletePointsBuilder::new(name).points(selector))
            .await
            .map_err(|e| unavailable("delete", e))?;
        Ok(())
    }

    /// Lists collections as a cheap round trip.
    async fn is_available(&self) -> bool {
        self.client.list_collections().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn payload_round_trips_through_qdrant_value() {
        let payload = json!({
            "text": "remember to water the plants",
            "tags": ["home", "chores"],
            "dim": 384,
            "score": 0.5,
            "confirmed": true,
            "dedupe_key": null,
        });

        let as_qdrant = json_to_payload(&payload);
        assert_eq!(as_qdrant.get("text").unwrap().kind, Some(Kind::StringValue("remember to water the plants".into())));
        assert_eq!(
            as_qdrant.get("tags").unwrap().kind,
            Some(Kind::ListValue(ListValue {
                values: vec![
                    QdrantValue { kind: Some(Kind::StringValue("home".into())) },
                    QdrantValue { kind: Some(Kind::StringValue("chores".into())) },
                ],
            }))
        );

        let round_tripped = payload_to_json(&as_qdrant);
        assert_eq!(round_tripped, payload);
    }

    #[test]
    fn nested_object_round_trips_via_struct_value() {
        let payload = json!({ "meta": { "source": "cli", "retries": 2 } });
        let as_qdrant = json_to_payload(&payload);
        let round_tripped = payload_to_json(&as_qdrant);
        assert_eq!(round_tripped, payload);
    }

    /// Requires a running Qdrant instance; exercises the real client
    /// end-to-end instead of just the in-process conversion helpers above.
    #[tokio::test]
    #[ignore] // Requires running Qdrant instance
    async fn live_upsert_and_retrieve_round_trips_payload() {
        let store = QdrantVectorStore::connect("http://localhost:6334").unwrap();
        let collection = "memory_core_qdrant_store_test";
        store.create_collection(collection, 4).await.unwrap();

        let payload = json!({ "text": "hello", "tags": ["a", "b"] });
        store
            .upsert(
                collection,
                vec![UpsertPoint { id: "1".to_string(), vector: vec![0.1, 0.2, 0.3, 0.4], payload: payload.clone() }],
            )
            .await
            .unwrap();

        let points = store.retrieve(collection, &["1".to_string()]).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].payload, payload);
    }
}
