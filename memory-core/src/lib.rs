//! The memory store core: identity and dedup, write coordination,
//! collection lifecycle and model validation, signed pagination cursors,
//! existence caching, and the error taxonomy the façade maps to HTTP.
//! Everything here is storage/embedder-agnostic — callers depend on
//! [`vector_store::VectorStore`] and `memory_embed::EmbeddingClient`, not
//! on Qdrant or Ollama directly.

pub mod cursor;
pub mod error;
pub mod lock_table;
pub mod model;
pub mod qdrant_store;
pub mod store;
pub mod vector_store;

pub use error::{MemoryError, Result};
pub use model::{IdStrategy, MemoryRecord, SearchHit};
pub use qdrant_store::QdrantVectorStore;
pub use store::{MemoryStore, StoreConfig, UpsertInput};
