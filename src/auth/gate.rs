//! Post-handshake authorization gate.
//!
//! The TLS layer already refuses peers without a CA-validated certificate.
//! This module re-checks authorization explicitly before any proxying logic
//! runs: the peer certificate must be present and must carry a usable
//! subject identity. Both relays share this contract.

use std::sync::Arc;

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rustls::pki_types::CertificateDer;
use serde_json::json;

use crate::auth::identity::{AuthError, ClientIdentity};
use crate::net::ConnectionId;

/// Per-connection authorization outcome, injected into request extensions
/// by the connection handler.
#[derive(Debug, Clone)]
pub struct ClientAuth {
    /// The authenticated identity, or `None` when the gate failed.
    pub identity: Option<Arc<ClientIdentity>>,
}

impl ClientAuth {
    /// Run the gate against the certificates the peer presented during the
    /// handshake and log the outcome.
    pub fn from_peer_certs(
        conn_id: ConnectionId,
        peer_certs: Option<&[CertificateDer<'static>]>,
    ) -> Self {
        let identity = match authorize(peer_certs) {
            Ok(identity) => {
                tracing::info!(
                    connection_id = %conn_id,
                    subject = %identity.common_name,
                    serial = %identity.serial,
                    "Client certificate accepted"
                );
                Some(Arc::new(identity))
            }
            Err(e) => {
                tracing::warn!(
                    connection_id = %conn_id,
                    error = %e,
                    "Client certificate rejected"
                );
                None
            }
        };

        Self { identity }
    }
}

/// Authorize a peer from its presented certificate chain.
///
/// Fails closed: no certificate, an unparseable certificate, or a
/// certificate without a subject common name all count as unauthenticated.
pub fn authorize(
    peer_certs: Option<&[CertificateDer<'static>]>,
) -> Result<ClientIdentity, AuthError> {
    let end_entity = peer_certs
        .and_then(|certs| certs.first())
        .ok_or(AuthError::MissingCertificate)?;

    ClientIdentity::from_der(end_entity)
}

/// Axum middleware enforcing the gate on every HTTP relay request.
///
/// Unauthenticated requests receive 401 with a structured error body and
/// never reach the forwarding handler, so the backend is never contacted.
pub async fn require_client_cert(request: Request, next: Next) -> Response {
    let authorized = request
        .extensions()
        .get::<ClientAuth>()
        .and_then(|auth| auth.identity.as_ref())
        .is_some();

    if !authorized {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Invalid client certificate" })),
        )
            .into_response();
    }

    next.run(request).await
}
