//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy
//! pair. All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the mTLS proxy pair.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// HTTP relay listener and backend settings.
    pub http: HttpProxyConfig,

    /// WebSocket relay listener and backend settings.
    pub websocket: WsProxyConfig,

    /// TLS material shared by both listeners.
    pub tls: TlsConfig,

    /// Listener limits (backpressure).
    pub listener: ListenerConfig,

    /// Certificate revocation seed data.
    pub revocation: RevocationConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// HTTP relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpProxyConfig {
    /// Bind address for the TLS listener (e.g., "0.0.0.0:3000").
    pub bind_address: String,

    /// Base URL of the backend service. The original request path and query
    /// are appended verbatim.
    pub backend_base_url: String,
}

impl Default for HttpProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            backend_base_url: "http://127.0.0.1:8188".to_string(),
        }
    }
}

/// WebSocket relay configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WsProxyConfig {
    /// Bind address for the TLS listener (e.g., "0.0.0.0:3001").
    pub bind_address: String,

    /// WebSocket URL of the backend endpoint.
    pub target_url: String,
}

impl Default for WsProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3001".to_string(),
            target_url: "ws://127.0.0.1:8188".to_string(),
        }
    }
}

/// TLS configuration for both listeners.
///
/// Client certificates are mandatory: the CA bundle defines which client
/// certificates are accepted during the handshake.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to the server certificate file (PEM).
    pub cert_path: String,

    /// Path to the server private key file (PEM).
    pub key_path: String,

    /// Path to the CA bundle that signed client certificates (PEM).
    pub ca_path: String,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: "keys/server-cert.pem".to_string(),
            key_path: "keys/server-key.pem".to_string(),
            ca_path: "keys/ca-cert.pem".to_string(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Maximum concurrent connections per listener (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
        }
    }
}

/// Revocation registry seed.
///
/// The serial numbers listed here form the in-memory revocation snapshot
/// queried at WebSocket connect time. The registry is read-only for the
/// lifetime of the process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct RevocationConfig {
    /// Revoked certificate serial numbers (hex, case-insensitive).
    pub revoked_serials: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}
