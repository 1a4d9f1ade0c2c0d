//! Opaque per-sync resumption token.

use airweave_error::CoreError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

/// A base64-encoded JSON blob whose interior shape belongs entirely to
/// the source that wrote it. The orchestrator reads and writes this value
/// without ever inspecting its contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncCursor(String);

impl SyncCursor {
    /// Encode a source-defined cursor value.
    #[must_use]
    pub fn encode(value: &Value) -> Self {
        let json = value.to_string();
        Self(BASE64.encode(json.as_bytes()))
    }

    /// Build directly from an already-encoded string, e.g. one loaded
    /// from persisted state.
    #[must_use]
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    /// The opaque wire form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode back to the source's JSON value.
    ///
    /// # Errors
    /// Returns [`CoreError::DataIntegrity`] if the stored value is not
    /// valid base64 or not valid JSON — a cursor should never be hand
    /// edited, so either failure indicates corruption.
    pub fn decode(&self) -> Result<Value, CoreError> {
        let bytes = BASE64.decode(&self.0).map_err(|err| CoreError::DataIntegrity {
            message: format!("cursor is not valid base64: {err}"),
        })?;
        serde_json::from_slice(&bytes).map_err(|err| CoreError::DataIntegrity {
            message: format!("cursor payload is not valid JSON: {err}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encode_then_decode_round_trips() {
        let value = json!({"page_token": "abc123", "offset": 42});
        let cursor = SyncCursor::encode(&value);
        assert_eq!(cursor.decode().unwrap(), value);
    }

    #[test]
    fn corrupted_cursor_fails_to_decode() {
        let cursor = SyncCursor::from_encoded("not-valid-base64!!!");
        assert!(cursor.decode().is_err());
    }
}
