//! Request-body validation (§1: "thin façade" scope — the core trusts its
//! callers; this module is where the documented bounds are actually
//! enforced before anything reaches `memory_core::MemoryStore`).

use memory_core::MemoryError;

use crate::handlers::MemoryCreate;

pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_LENGTH: usize = 100;
pub const MAX_SOURCE_LENGTH: usize = 200;
pub const MIN_TOP_K: usize = 1;
pub const MAX_TOP_K: usize = 50;
pub const MIN_LIST_LIMIT: usize = 1;
pub const MAX_LIST_LIMIT: usize = 100;

pub fn validate_memory_create(item: &MemoryCreate, max_text_length: usize) -> Result<(), MemoryError> {
    if item.text.trim().is_empty() {
        return Err(MemoryError::Validation("text must not be empty".into()));
    }
    if item.text.chars().count() > max_text_length {
        return Err(MemoryError::Validation(format!(
            "text exceeds maximum length of {max_text_length} characters"
        )));
    }
    let tags = item.tags.as_deref().unwrap_or_default();
    if tags.len() > MAX_TAGS {
        return Err(MemoryError::Validation(format!("at most {MAX_TAGS} tags are allowed")));
    }
    for tag in tags {
        if tag.chars().count() > MAX_TAG_LENGTH {
            return Err(MemoryError::Validation(format!(
                "each tag must be at most {MAX_TAG_LENGTH} characters"
            )));
        }
    }
    if let Some(source) = item.source.as_deref() {
        if source.chars().count() > MAX_SOURCE_LENGTH {
            return Err(MemoryError::Validation(format!(
                "source must be at most {MAX_SOURCE_LENGTH} characters"
            )));
        }
    }
    Ok(())
}

pub fn validate_top_k(top_k: usize) -> Result<(), MemoryError> {
    if !(MIN_TOP_K..=MAX_TOP_K).contains(&top_k) {
        return Err(MemoryError::Validation(format!(
            "top_k must be between {MIN_TOP_K} and {MAX_TOP_K}"
        )));
    }
    Ok(())
}

pub fn validate_list_limit(limit: usize) -> Result<(), MemoryError> {
    if !(MIN_LIST_LIMIT..=MAX_LIST_LIMIT).contains(&limit) {
        return Err(MemoryError::Validation(format!(
            "limit must be between {MIN_LIST_LIMIT} and {MAX_LIST_LIMIT}"
        )));
    }
    Ok(())
}

pub fn validate_batch_size(len: usize, max_batch_size: usize) -> Result<(), MemoryError> {
    if len == 0 {
        return Err(MemoryError::Validation("items must not be empty".into()));
    }
    if len > max_batch_size {
        return Err(MemoryError::Validation(format!(
            "batch exceeds maximum size of {max_batch_size} items"
        )));
    }
    Ok(())
}
