//! Outbound request construction.
//!
//! # Responsibilities
//! - Build the target URL: backend base + original path and query, verbatim
//! - Filter hop-by-hop and length-bearing request headers
//! - Pin the outbound Host header to the target authority
//!
//! # Design Decisions
//! - Path and query are copied without re-encoding or normalization so
//!   arbitrary backend routing keeps working
//! - content-length is dropped because the HTTP client re-frames the body;
//!   host and connection headers are connection-local and must not cross

use axum::http::header::{HeaderMap, HeaderValue, HOST};
use axum::http::Uri;

/// Request headers that never cross the inbound hop.
pub const EXCLUDED_REQUEST_HEADERS: [&str; 4] =
    ["host", "connection", "content-length", "transfer-encoding"];

/// Build the backend URI for an inbound request.
///
/// The original path and query are appended to the configured base URL as
/// received, unmodified encoding included.
pub fn build_target_uri(base: &str, original: &Uri) -> Result<Uri, axum::http::uri::InvalidUri> {
    let path_and_query = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    format!("{}{}", base, path_and_query).parse()
}

/// Copy inbound headers for the outbound request, dropping the excluded set
/// and pinning Host to the target authority.
pub fn filter_request_headers(inbound: &HeaderMap, target_authority: &HeaderValue) -> HeaderMap {
    let mut outbound = HeaderMap::with_capacity(inbound.len() + 1);
    for (name, value) in inbound {
        if EXCLUDED_REQUEST_HEADERS.contains(&name.as_str()) {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }
    outbound.insert(HOST, target_authority.clone());
    outbound
}
