//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection
//!     → listener.rs (accept loop, connection limits)
//!     → tls.rs (mandatory mTLS handshake)
//!     → connection.rs (connection ids for audit correlation)
//!     → Hand off to the HTTP or WebSocket relay
//! ```
//!
//! # Design Decisions
//! - Bounded accept queue prevents resource exhaustion
//! - The handshake itself rejects peers without a CA-validated certificate
//! - Certificate material is loaded once at startup; load failure is fatal

pub mod connection;
pub mod listener;
pub mod tls;

pub use connection::ConnectionId;
pub use listener::{ConnectionPermit, Listener, ListenerError};
pub use tls::{build_acceptor, TlsError};
