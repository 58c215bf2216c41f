//! HTTP relay subsystem.
//!
//! # Data Flow
//! ```text
//! TLS connection (client certificate verified during handshake)
//!     → server.rs (gate check, Axum dispatch)
//!     → request.rs (target URL, filtered headers, body passthrough)
//!     → backend (single attempt, no redirects, no decompression)
//!     → response.rs (filtered headers, JSON-vs-passthrough shaping)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use server::HttpServer;
