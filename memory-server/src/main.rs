//! Process entry point: logging init, configuration, collaborator
//! construction, the model-mismatch startup gate, then the `actix-web`
//! server. Tracing first, then config, then long-lived clients built
//! once, then `HttpServer::new`.

mod auth;
mod config;
mod error;
mod handlers;
mod validation;

use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use memory_core::{MemoryStore, QdrantVectorStore, StoreConfig};
use memory_embed::OllamaEmbeddingClient;
use tracing_subscriber::EnvFilter;

use config::Config;
use handlers::AppState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::load();

    let vector_store: Arc<QdrantVectorStore> = Arc::new(
        QdrantVectorStore::connect(&config.qdrant_url())
            .map_err(|e| anyhow::anyhow!(e.to_string()))
            .context("failed to construct the Qdrant client")?,
    );
    let embedder = Arc::new(OllamaEmbeddingClient::new(
        config.ollama_base_url.clone(),
        config.embed_model.clone(),
        config.ollama_embed_path.clone(),
    ));

    let store_config = StoreConfig::new(
        config.collection_name.clone(),
        config.embed_model.clone(),
        config.cursor_secret(),
    );
    let store = Arc::new(MemoryStore::new(vector_store, embedder, store_config));

    // Model mismatch is fatal at startup; any other validation error
    // (including "can't reach the collection right now") is a warning —
    // connectivity problems shouldn't block the process from coming up.
    if let Err(e) = store.validate_model().await {
        if matches!(e, memory_core::MemoryError::ModelMismatch { .. }) {
            tracing::error!(error = %e, "refusing to start: embedding model mismatch");
            anyhow::bail!(e);
        }
        tracing::warn!(error = %e, "model validation could not complete; continuing");
    }

    let bind_addr = (config.api_host.clone(), config.api_port);
    let app_state = web::Data::new(AppState { store, config: Arc::new(config) });

    tracing::info!(host = %bind_addr.0, port = bind_addr.1, "starting memory-server");

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(web::JsonConfig::default().error_handler(|err, _req| {
                actix_web::error::InternalError::from_response(
                    err,
                    actix_web::HttpResponse::UnprocessableEntity().json(serde_json::json!({
                        "error": "validation_error",
                        "detail": "malformed request body",
                    })),
                )
                .into()
            }))
            .service(handlers::health)
            .service(handlers::create_memory)
            .service(handlers::search)
            .service(handlers::ingest)
            .service(handlers::list_memories)
            .service(handlers::delete_memory)
    })
    .bind(bind_addr)?
    .run()
    .await
}
