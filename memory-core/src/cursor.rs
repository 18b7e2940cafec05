//! Signed pagination cursors. The canonical payload is `{"offset":
//! <value>}`, the MAC is HMAC-SHA256 hex over that payload, and the
//! envelope `{"offset": …, "qh": …}` is URL-safe base64 encoded.
//! `hmac::Mac::verify_slice` gives the constant-time comparison a
//! hand-rolled `compare_digest` would otherwise need to provide.

use base64::Engine;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sha2::Sha256;

use crate::error::MemoryError;

type HmacSha256 = Hmac<Sha256>;

#[derive(Serialize)]
struct CanonicalPayload<'a> {
    offset: &'a JsonValue,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    offset: JsonValue,
    qh: String,
}

pub struct CursorCodec {
    secret: Vec<u8>,
}

impl CursorCodec {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self { secret: secret.into() }
    }

    fn mac(&self, offset: &JsonValue) -> Result<String, MemoryError> {
        let canonical = serde_json::to_vec(&CanonicalPayload { offset })
            .map_err(|e| MemoryError::Internal(format!("cursor serialization: {e}")))?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| MemoryError::Internal(format!("cursor hmac key: {e}")))?;
        mac.update(&canonical);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    pub fn encode(&self, offset: &JsonValue) -> Result<String, MemoryError> {
        let qh = self.mac(offset)?;
        let envelope = Envelope { offset: offset.clone(), qh };
        let bytes = serde_json::to_vec(&envelope)
            .map_err(|e| MemoryError::Internal(format!("cursor serialization: {e}")))?;
        Ok(base64::engine::general_purpose::URL_SAFE.encode(bytes))
    }

    pub fn decode(&self, cursor: &str) -> Result<JsonValue, MemoryError> {
        let bytes = base64::engine::general_purpose::URL_SAFE
            .decode(cursor)
            .map_err(|_| MemoryError::InvalidCursor)?;
        let envelope: Envelope =
            serde_json::from_slice(&bytes).map_err(|_| MemoryError::InvalidCursor)?;

        let expected = self.mac(&envelope.offset)?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|_| MemoryError::InvalidCursor)?;
        let canonical = serde_json::to_vec(&CanonicalPayload { offset: &envelope.offset })
            .map_err(|_| MemoryError::InvalidCursor)?;
        mac.update(&canonical);

        let expected_bytes =
            hex::decode(&expected).map_err(|_| MemoryError::InvalidCursor)?;
        mac.verify_slice(&expected_bytes)
            .map_err(|_| MemoryError::InvalidCursor)?;

        Ok(envelope.offset)
    }
}
