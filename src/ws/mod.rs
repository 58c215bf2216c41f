//! WebSocket relay subsystem.
//!
//! # Data Flow
//! ```text
//! TLS connection (client certificate verified during handshake)
//!     → server.rs (gate check, upgrade, revocation query, outbound connect)
//!     → session.rs (paired sockets, two directional pumps, closure protocol)
//! ```
//!
//! # Design Decisions
//! - Revocation is queried exactly once per session, before the outbound
//!   connection is attempted
//! - Each session exclusively owns its client/target socket pair; nothing
//!   is shared between sessions
//! - A session terminates both sides together; there is no dangling socket

pub mod server;
pub mod session;

pub use server::WsServer;
