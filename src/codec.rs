// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote-tier document format.
//!
//! Values are wrapped in a small JSON envelope that records the Rust type
//! they were written as, so a reader asking for a different shape gets a
//! clean [`RemoteError::Codec`] instead of a half-parsed value:
//!
//! ```json
//! {"@type": "shop::Product", "value": {"id": 42, "name": "widget"}}
//! ```
//!
//! The tag is [`std::any::type_name`], which is exact rather than structural:
//! a value written as `&str` does not read back as `String`, and the names
//! are only guaranteed stable within one compiler version. Processes sharing
//! a remote tier should be built by the same toolchain.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::storage::traits::RemoteError;

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    #[serde(rename = "@type")]
    type_name: &'a str,
    value: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(rename = "@type")]
    type_name: String,
    value: T,
}

/// Serialize `value` into a typed JSON document.
pub fn encode<T: Serialize>(value: &T) -> Result<String, RemoteError> {
    serde_json::to_string(&EnvelopeRef {
        type_name: std::any::type_name::<T>(),
        value,
    })
    .map_err(|e| RemoteError::Codec(format!("encode failed: {e}")))
}

/// Parse a typed JSON document, rejecting documents written for another type.
pub fn decode<T: DeserializeOwned>(document: &str) -> Result<T, RemoteError> {
    // Check the tag before materializing the payload as T
    let header: Envelope<serde::de::IgnoredAny> = serde_json::from_str(document)
        .map_err(|e| RemoteError::Codec(format!("malformed document: {e}")))?;

    let expected = std::any::type_name::<T>();
    if header.type_name != expected {
        return Err(RemoteError::Codec(format!(
            "type mismatch: stored {}, requested {}",
            header.type_name, expected
        )));
    }

    let envelope: Envelope<T> = serde_json::from_str(document)
        .map_err(|e| RemoteError::Codec(format!("payload decode failed: {e}")))?;
    Ok(envelope.value)
}
