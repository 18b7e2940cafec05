//! Error taxonomy surfaced by the memory store to its façade.
//!
//! One variant per distinct failure kind the store can report; the façade
//! maps each to an HTTP status and an error code (see
//! `memory-server::error_response`).
//! Transport errors from `qdrant-client` and `memory-embed` are translated
//! into `VectorStoreUnavailable` / embedding's own error at the adapter
//! boundary, not via `#[from]` on this enum — the enum doesn't know about
//! transport types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("{0}")]
    Validation(String),

    #[error("invalid or tampered cursor")]
    InvalidCursor,

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0}")]
    NotFound(String),

    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("vector store unavailable: {0}")]
    VectorStoreUnavailable(String),

    #[error(
        "model mismatch: collection uses {stored_model} ({stored_dim}) but configured model is {current_model} ({current_dim})"
    )]
    ModelMismatch {
        stored_model: String,
        stored_dim: usize,
        current_model: String,
        current_dim: usize,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, MemoryError>;

impl MemoryError {
    /// Stable error code used in the HTTP error envelope and in ingest's
    /// per-item error strings.
    pub fn code(&self) -> &'static str {
        match self {
            MemoryError::Validation(_) => "validation_error",
            MemoryError::InvalidCursor => "invalid_cursor",
            MemoryError::Unauthorized => "unauthorized",
            MemoryError::NotFound(_) => "collection_not_found",
            MemoryError::EmbeddingUnavailable(_) => "embedding_unavailable",
            MemoryError::VectorStoreUnavailable(_) => "qdrant_unavailable",
            MemoryError::ModelMismatch { .. } => "model_mismatch",
            MemoryError::Internal(_) => "internal_error",
        }
    }
}
