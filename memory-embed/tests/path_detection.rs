//! Exercises §4.1's path auto-detection and pinning (P7) against a mock
//! Ollama server, since the production client only ever proves its
//! behaviour over real HTTP.

use memory_embed::{EmbeddingClient, OllamaEmbeddingClient, EMBEDDINGS_PATH, EMBED_PATH};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn falls_back_to_embeddings_path_and_pins_it() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EMBED_PATH))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(EMBEDDINGS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embedding": [0.1, 0.2]})))
        .mount(&server)
        .await;

    let client = OllamaEmbeddingClient::new(server.uri(), "nomic-embed-text", EMBED_PATH);

    let first = client.embed("hello").await.unwrap();
    assert_eq!(first, vec![0.1, 0.2]);

    // The preferred path keeps returning 404; a correctly-pinned client
    // must not re-try it, so later calls still succeed via the fallback.
    let second = client.embed("again").await.unwrap();
    assert_eq!(second, vec![0.1, 0.2]);
}

#[tokio::test]
async fn uses_preferred_path_when_it_succeeds() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EMBED_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"embeddings": [[1.0, 2.0, 3.0]]})))
        .mount(&server)
        .await;

    let client = OllamaEmbeddingClient::new(server.uri(), "nomic-embed-text", EMBED_PATH);
    let vector = client.embed("hello").await.unwrap();
    assert_eq!(vector, vec![1.0, 2.0, 3.0]);
    assert_eq!(client.probe_dimension().await.unwrap(), 3);
}

#[tokio::test]
async fn unrecognised_shape_is_embedding_unavailable() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(EMBED_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"wat": 1})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(EMBEDDINGS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"wat": 1})))
        .mount(&server)
        .await;

    let client = OllamaEmbeddingClient::new(server.uri(), "nomic-embed-text", EMBED_PATH);
    assert!(client.embed("hello").await.is_err());
}
