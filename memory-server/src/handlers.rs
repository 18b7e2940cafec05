//! HTTP handlers (§6). Each one validates its input (§1 façade scope),
//! checks the bearer-token gate, then calls straight into
//! `memory_core::MemoryStore` and serialises the result. Error mapping is
//! `ApiError`'s job via `actix_web::ResponseError` — handlers just use `?`.

use std::sync::Arc;
use std::time::Duration;

use actix_web::{delete, get, post, web, HttpRequest, HttpResponse};
use memory_core::{IdStrategy, MemoryError, MemoryStore, UpsertInput};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth;
use crate::config::Config;
use crate::error::ApiError;
use crate::validation;

pub struct AppState {
    pub store: Arc<MemoryStore>,
    pub config: Arc<Config>,
}

#[derive(Debug, Deserialize)]
pub struct MemoryCreate {
    pub text: String,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub dedupe_key: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct MemoryCreatedResponse {
    id: String,
    id_strategy: &'static str,
}

fn default_source() -> String {
    "unspecified".to_string()
}

impl MemoryCreate {
    fn into_upsert_input(self) -> UpsertInput {
        UpsertInput {
            text: self.text,
            tags: self.tags.unwrap_or_default(),
            source: self.source.unwrap_or_else(default_source),
            dedupe_key: self.dedupe_key,
            external_id: self.external_id,
        }
    }
}

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let timeout = state.config.health_check_timeout;

    let qdrant = match tokio::time::timeout(timeout, state.store.vector_store_available()).await {
        Ok(available) => Some(available),
        Err(_) => None,
    };
    let ollama = state.store.embedder_available(timeout).await;

    let body = json!({
        "status": health_status(qdrant, ollama),
        "qdrant": qdrant,
        "ollama": ollama,
    });

    if qdrant == Some(true) && ollama == Some(true) {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// Qdrant unreachable (definitely down or timed out) is `"unavailable"` —
/// list/search/delete all degrade to empty/404 without it. An embedder
/// problem alone is `"degraded"`: reads still work, only writes and
/// search are affected.
fn health_status(qdrant: Option<bool>, ollama: Option<bool>) -> &'static str {
    if qdrant == Some(true) && ollama == Some(true) {
        "ok"
    } else if qdrant != Some(true) {
        "unavailable"
    } else {
        "degraded"
    }
}

#[post("/memory")]
pub async fn create_memory(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<MemoryCreate>,
) -> Result<HttpResponse, ApiError> {
    auth::check(&req, &state.config)?;
    validation::validate_memory_create(&body, state.config.max_text_length)?;

    let (id, id_strategy) = state.store.upsert(body.into_inner().into_upsert_input()).await?;

    let status = match id_strategy {
        IdStrategy::Random => HttpResponse::Created(),
        IdStrategy::Deduped => HttpResponse::Ok(),
    };
    Ok(status.json(MemoryCreatedResponse { id, id_strategy: id_strategy.as_str() }))
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_include_text")]
    pub include_text: bool,
}

fn default_top_k() -> usize {
    5
}

fn default_include_text() -> bool {
    true
}

#[post("/search")]
pub async fn search(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<SearchRequest>,
) -> Result<HttpResponse, ApiError> {
    auth::check(&req, &state.config)?;
    validation::validate_top_k(body.top_k)?;

    let results = state.store.search(&body.query, body.top_k, body.include_text).await?;
    Ok(HttpResponse::Ok().json(json!({ "results": results })))
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub items: Vec<MemoryCreate>,
}

#[derive(Debug, Serialize)]
struct IngestError {
    index: usize,
    error: String,
}

#[derive(Debug, Serialize)]
struct IngestResponse {
    succeeded: usize,
    failed: usize,
    errors: Vec<IngestError>,
}

/// Per-item errors are prefixed with the originating kind (§7), so a
/// caller scanning a batch response can tell an embedding outage from a
/// plain validation failure without re-parsing status codes.
fn ingest_error_message(err: MemoryError) -> String {
    match err {
        MemoryError::EmbeddingUnavailable(detail) => format!("embedding_unavailable: {detail}"),
        MemoryError::VectorStoreUnavailable(detail) => format!("qdrant_unavailable: {detail}"),
        other => other.to_string(),
    }
}

#[post("/ingest")]
pub async fn ingest(
    req: HttpRequest,
    state: web::Data<AppState>,
    body: web::Json<IngestRequest>,
) -> Result<HttpResponse, ApiError> {
    auth::check(&req, &state.config)?;
    validation::validate_batch_size(body.items.len(), state.config.max_batch_size)?;

    let mut succeeded = 0usize;
    let mut errors = Vec::new();

    for (index, item) in body.into_inner().items.into_iter().enumerate() {
        let outcome = match validation::validate_memory_create(&item, state.config.max_text_length) {
            Ok(()) => state.store.upsert(item.into_upsert_input()).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(_) => succeeded += 1,
            Err(err) => errors.push(IngestError { index, error: ingest_error_message(err) }),
        }
    }

    Ok(HttpResponse::Ok().json(IngestResponse { failed: errors.len(), succeeded, errors }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_list_limit")]
    pub limit: usize,
    #[serde(default)]
    pub cursor: Option<String>,
}

fn default_list_limit() -> usize {
    20
}

#[get("/memories")]
pub async fn list_memories(
    req: HttpRequest,
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse, ApiError> {
    auth::check(&req, &state.config)?;
    validation::validate_list_limit(query.limit)?;

    let (memories, next_cursor) = state.store.list(query.limit, query.cursor.as_deref()).await?;
    Ok(HttpResponse::Ok().json(json!({ "memories": memories, "next_cursor": next_cursor })))
}

#[delete("/memory/{id}")]
pub async fn delete_memory(
    req: HttpRequest,
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    auth::check(&req, &state.config)?;
    state.store.delete(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "status": "deleted" })))
}

#[cfg(all(test, feature = "test-util"))]
mod tests {
    use super::*;
    use actix_web::{test, App};
    use memory_core::vector_store::fake::FakeVectorStore;
    use memory_core::StoreConfig;
    use memory_embed::fake::FakeEmbeddingClient;

    fn test_config() -> Config {
        Config {
            qdrant_host: "localhost".into(),
            qdrant_port: 6333,
            collection_name: "memories".into(),
            ollama_base_url: "http://localhost:11434".into(),
            embed_model: "nomic-embed-text".into(),
            ollama_embed_path: "/api/embed".into(),
            api_host: "127.0.0.1".into(),
            api_port: 8100,
            api_auth_token: None,
            max_text_length: 8000,
            max_batch_size: 100,
            health_check_timeout: Duration::from_secs(1),
        }
    }

    fn test_state() -> web::Data<AppState> {
        let vs = Arc::new(FakeVectorStore::new());
        let embed = Arc::new(FakeEmbeddingClient::new());
        let config = test_config();
        let store_config =
            StoreConfig::new(config.collection_name.clone(), config.embed_model.clone(), b"test-secret".to_vec());
        let store = Arc::new(MemoryStore::new(vs, embed, store_config));
        web::Data::new(AppState { store, config: Arc::new(config) })
    }

    #[actix_web::test]
    async fn write_then_search_roundtrip() {
        let state = test_state();
        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .service(create_memory)
                .service(search),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/memory")
            .set_json(&json!({"text": "The quick brown fox"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);

        let req = test::TestRequest::post()
            .uri("/search")
            .set_json(&json!({"query": "fox", "top_k": 5}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        let results = body["results"].as_array().unwrap();
        assert!(results.iter().any(|r| r["text"].as_str().unwrap_or_default().contains("fox")));
    }

    #[actix_web::test]
    async fn dedup_overwrite_reports_random_then_deduped() {
        let state = test_state();
        let app = test::init_service(App::new().app_data(state.clone()).service(create_memory)).await;

        let req = test::TestRequest::post()
            .uri("/memory")
            .set_json(&json!({"text": "First", "dedupe_key": "k1"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
        let first: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(first["id_strategy"], "random");

        let req = test::TestRequest::post()
            .uri("/memory")
            .set_json(&json!({"text": "Second", "dedupe_key": "k1"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let second: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(second["id_strategy"], "deduped");
        assert_eq!(second["id"], first["id"]);
    }

    #[actix_web::test]
    async fn text_over_limit_is_422() {
        let state = test_state();
        let app = test::init_service(App::new().app_data(state.clone()).service(create_memory)).await;

        let req = test::TestRequest::post()
            .uri("/memory")
            .set_json(&json!({"text": "a".repeat(8001)}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 422);
    }

    #[actix_web::test]
    async fn ingest_batch_isolates_per_item_failures() {
        let state = test_state();
        let app = test::init_service(App::new().app_data(state.clone()).service(ingest)).await;

        let items: Vec<serde_json::Value> = vec![
            json!({"text": "ok one"}),
            json!({"text": "a".repeat(8001)}),
            json!({"text": "ok two"}),
        ];
        let req = test::TestRequest::post()
            .uri("/ingest")
            .set_json(&json!({"items": items}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["succeeded"], 2);
        assert_eq!(body["failed"], 1);
        assert_eq!(body["errors"][0]["index"], 1);
    }

    #[actix_web::test]
    async fn pagination_pages_do_not_overlap() {
        let state = test_state();
        let app = test::init_service(
            App::new().app_data(state.clone()).service(create_memory).service(list_memories),
        )
        .await;

        for i in 0..5 {
            let req = test::TestRequest::post()
                .uri("/memory")
                .set_json(&json!({"text": format!("memory {i}")}))
                .to_request();
            test::call_service(&app, req).await;
        }

        let req = test::TestRequest::get().uri("/memories?limit=2").to_request();
        let resp = test::call_service(&app, req).await;
        let page1: serde_json::Value = test::read_body_json(resp).await;
        let cursor = page1["next_cursor"].as_str().expect("more pages remain").to_string();
        let ids1: Vec<String> = page1["memories"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids1.len(), 2);

        let req = test::TestRequest::get().uri(&format!("/memories?limit=2&cursor={cursor}")).to_request();
        let resp = test::call_service(&app, req).await;
        let page2: serde_json::Value = test::read_body_json(resp).await;
        let ids2: Vec<String> = page2["memories"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m["id"].as_str().unwrap().to_string())
            .collect();
        assert!(ids2.iter().all(|id| !ids1.contains(id)));
    }

    #[actix_web::test]
    async fn tampered_cursor_is_400() {
        let state = test_state();
        let app = test::init_service(App::new().app_data(state.clone()).service(list_memories)).await;

        let req = test::TestRequest::get().uri("/memories?limit=10&cursor=not-a-real-cursor").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 400);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "invalid_cursor");
    }

    #[actix_web::test]
    async fn delete_then_redelete_is_404() {
        let state = test_state();
        let app = test::init_service(
            App::new().app_data(state.clone()).service(create_memory).service(delete_memory),
        )
        .await;

        let req = test::TestRequest::post().uri("/memory").set_json(&json!({"text": "a"})).to_request();
        let resp = test::call_service(&app, req).await;
        let created: serde_json::Value = test::read_body_json(resp).await;
        let id = created["id"].as_str().unwrap().to_string();

        let req = test::TestRequest::delete().uri(&format!("/memory/{id}")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);

        let req = test::TestRequest::delete().uri(&format!("/memory/{id}")).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);
    }

    #[actix_web::test]
    async fn degraded_embedder_leaves_reads_working() {
        let vs = Arc::new(FakeVectorStore::new());
        let embed = Arc::new(FakeEmbeddingClient::new());
        let config = test_config();
        let store_config =
            StoreConfig::new(config.collection_name.clone(), config.embed_model.clone(), b"test-secret".to_vec());
        let store = Arc::new(MemoryStore::new(vs, embed.clone(), store_config));
        let state = web::Data::new(AppState { store, config: Arc::new(config) });

        let app = test::init_service(
            App::new()
                .app_data(state.clone())
                .service(create_memory)
                .service(list_memories)
                .service(delete_memory)
                .service(health),
        )
        .await;

        embed.set_unavailable(true);

        let req = test::TestRequest::post().uri("/memory").set_json(&json!({"text": "x"})).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 503);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "embedding_unavailable");

        let req = test::TestRequest::get().uri("/memories").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["memories"].as_array().unwrap().len(), 0);

        let req = test::TestRequest::delete().uri(&format!("/memory/{}", uuid::Uuid::new_v4())).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 404);

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 503);
    }

    #[actix_web::test]
    async fn auth_gate_blocks_missing_or_wrong_token() {
        let vs = Arc::new(FakeVectorStore::new());
        let embed = Arc::new(FakeEmbeddingClient::new());
        let mut config = test_config();
        config.api_auth_token = Some("secret-token".to_string());
        let store_config =
            StoreConfig::new(config.collection_name.clone(), config.embed_model.clone(), b"test-secret".to_vec());
        let store = Arc::new(MemoryStore::new(vs, embed, store_config));
        let state = web::Data::new(AppState { store, config: Arc::new(config) });

        let app = test::init_service(App::new().app_data(state.clone()).service(create_memory)).await;

        let req = test::TestRequest::post().uri("/memory").set_json(&json!({"text": "a"})).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);

        let req = test::TestRequest::post()
            .uri("/memory")
            .insert_header(("Authorization", "Bearer secret-token"))
            .set_json(&json!({"text": "a"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
    }
}
