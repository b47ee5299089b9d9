//! Transport-safe text encoding: JSON wrapped in standard base64.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode base64 text into an arbitrary JSON value
pub fn decode(text: &str) -> Result<Value, CodecError> {
    decode_as(text)
}

/// Decode base64 text straight into a typed value
pub fn decode_as<T: DeserializeOwned>(text: &str) -> Result<T, CodecError> {
    let bytes = STANDARD.decode(text.trim())?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Encode a JSON value as compact JSON wrapped in base64
pub fn encode(value: &Value) -> String {
    STANDARD.encode(value.to_string())
}
