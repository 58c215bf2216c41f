//! Response shaping.
//!
//! # Responsibilities
//! - Filter hop-by-hop headers from the backend response
//! - Decide between JSON re-encoding and byte-identical passthrough
//!
//! # Design Decisions
//! - The JSON-vs-passthrough split is a named decision (`ResponseShape`)
//!   rather than an inline branch: JSON bodies are parsed and re-serialized
//!   through the normal JSON output path, so their byte layout may differ
//!   from the backend's; every other content type is returned byte-identical
//! - A body that claims JSON but does not parse is an upstream protocol
//!   failure and surfaces as 500, never passed through corrupted

use axum::body::Bytes;
use axum::http::header::{HeaderMap, CONTENT_TYPE};

/// Response headers that never cross the outbound hop.
pub const EXCLUDED_RESPONSE_HEADERS: [&str; 3] =
    ["transfer-encoding", "connection", "content-encoding"];

/// How a backend response body is relayed to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Parse as JSON and re-serialize (layout may change, semantics do not).
    Json,
    /// Relay bytes untouched.
    Passthrough,
}

impl ResponseShape {
    /// Choose the shape from the backend's content-type header.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let is_json = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("application/json"))
            .unwrap_or(false);

        if is_json {
            ResponseShape::Json
        } else {
            ResponseShape::Passthrough
        }
    }

    /// Apply the shape to the collected body bytes.
    pub fn apply(self, body: Bytes) -> Result<Bytes, serde_json::Error> {
        match self {
            ResponseShape::Json => {
                let value: serde_json::Value = serde_json::from_slice(&body)?;
                Ok(Bytes::from(serde_json::to_vec(&value)?))
            }
            ResponseShape::Passthrough => Ok(body),
        }
    }
}

/// Copy backend response headers for the client, dropping the excluded set.
pub fn filter_response_headers(backend: &HeaderMap) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(backend.len());
    for (name, value) in backend {
        if EXCLUDED_RESPONSE_HEADERS.contains(&name.as_str()) {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }
    outbound
}
