//! Data model: the memory record, the collection sentinel, and the small
//! value types the store hands back to its caller.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// DNS namespace UUID from RFC 4122, reused here as a stable application
/// namespace for deriving deduped ids. Matches the reference service's
/// `APP_NAMESPACE`.
pub const APP_NAMESPACE: Uuid = Uuid::from_u128(0x6ba7b810_9dad_11d1_80b4_00c0_4fd4_30c8);

/// Literal name the sentinel point is derived from, under `APP_NAMESPACE`.
pub const SENTINEL_KEY: &str = "__meta__";

/// Current schema version stamped on every non-sentinel record.
pub const SCHEMA_VERSION: i64 = 1;

/// One stored memory, as returned by list/search and as written by upsert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: String,
    pub written_at: String,
    pub first_written_at: String,
    #[serde(default)]
    pub dedupe_key: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
}

/// How an id was assigned on a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    Random,
    Deduped,
}

impl IdStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            IdStrategy::Random => "random",
            IdStrategy::Deduped => "deduped",
        }
    }
}

/// A single similarity-search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub tags: Vec<String>,
    pub source: String,
    pub written_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Derive the deterministic id for a dedupe key, per §4.5.1: version-5 UUID
/// over `APP_NAMESPACE` and the literal `"v1:" + dedupe_key`. The `v1:`
/// prefix is a schema-version guard for the id derivation itself.
pub fn deduped_id(dedupe_key: &str) -> Uuid {
    Uuid::new_v5(&APP_NAMESPACE, format!("v1:{dedupe_key}").as_bytes())
}

/// Id of the collection sentinel point.
pub fn sentinel_id() -> Uuid {
    Uuid::new_v5(&APP_NAMESPACE, SENTINEL_KEY.as_bytes())
}

pub fn now_rfc3339() -> String {
    // chrono's to_rfc3339 emits a numeric UTC offset (+00:00); normalize
    // to the `Z` suffix callers expect.
    chrono::Utc::now().to_rfc3339().replace("+00:00", "Z")
}
