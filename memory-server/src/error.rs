//! Maps `memory_core::MemoryError` to HTTP. A thin newtype wrapper
//! around the core's error, since neither `ResponseError` nor
//! `MemoryError` is local to this crate — the orphan rule requires
//! wrapping before the impl.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use memory_core::MemoryError;
use serde::Serialize;
use serde_json::Value as JsonValue;

#[derive(Serialize)]
struct ErrorEnvelope {
    error: &'static str,
    detail: JsonValue,
}

#[derive(Debug)]
pub struct ApiError(pub MemoryError);

impl From<MemoryError> for ApiError {
    fn from(e: MemoryError) -> Self {
        ApiError(e)
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            MemoryError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            MemoryError::InvalidCursor => StatusCode::BAD_REQUEST,
            MemoryError::Unauthorized => StatusCode::UNAUTHORIZED,
            MemoryError::NotFound(_) => StatusCode::NOT_FOUND,
            MemoryError::EmbeddingUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            MemoryError::VectorStoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            MemoryError::ModelMismatch { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            MemoryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(ErrorEnvelope { error: self.0.code(), detail: JsonValue::String(self.0.to_string()) })
    }
}
