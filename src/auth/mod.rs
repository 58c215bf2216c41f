//! Client-certificate authentication subsystem.
//!
//! # Data Flow
//! ```text
//! TLS handshake (net/tls.rs, CA-validated or refused)
//!     → identity.rs (parse peer certificate into ClientIdentity)
//!     → gate.rs (explicit post-handshake authorization check)
//!     → HTTP relay (401 JSON on failure)
//!     → WebSocket relay (refused upgrade on failure,
//!       revocation.rs queried once per session at connect time)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a missing certificate, unparseable DER, or absent subject
//!   CN is treated as unauthenticated
//! - The authenticated identity is logged for audit correlation, never
//!   forwarded to the backend
//! - Revocation is an injected capability, pluggable for a real CRL/OCSP
//!   source

pub mod gate;
pub mod identity;
pub mod revocation;

pub use gate::{require_client_cert, ClientAuth};
pub use identity::{AuthError, ClientIdentity};
pub use revocation::{InMemoryRevocationList, RevocationStore};
