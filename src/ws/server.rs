//! WebSocket relay server setup.
//!
//! # Responsibilities
//! - Accept TLS connections (client certificate verified during handshake)
//! - Refuse the upgrade with 401 when the gate fails
//! - Query the revocation store once, before connecting out
//! - Open the outbound connection and hand both sockets to the session
//!
//! # Design Decisions
//! - A revoked certificate closes the client with 1008 and the outbound
//!   leg is never opened
//! - An outbound connect failure closes the client with 1011, the same
//!   code a mid-session target error uses

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tokio_tungstenite::tungstenite::handshake::server::{
    ErrorResponse, Request as UpgradeRequest, Response as UpgradeResponse,
};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use uuid::Uuid;

use crate::auth::gate::ClientAuth;
use crate::auth::revocation::RevocationStore;
use crate::config::WsProxyConfig;
use crate::net::{ConnectionId, ConnectionPermit, Listener};
use crate::ws::session;

/// Close reason sent when the peer certificate is revoked.
const REVOKED_REASON: &str = "Certificate revoked";

/// TLS server for the WebSocket relay.
pub struct WsServer {
    config: WsProxyConfig,
    revocation: Arc<dyn RevocationStore>,
}

impl WsServer {
    /// Create a new WebSocket relay with an injected revocation store.
    pub fn new(config: WsProxyConfig, revocation: Arc<dyn RevocationStore>) -> Self {
        Self { config, revocation }
    }

    /// Run the relay until the shutdown signal fires.
    pub async fn run(
        self,
        listener: Listener,
        acceptor: TlsAcceptor,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, target = %self.config.target_url, "WebSocket relay listening");
        }

        let config = Arc::new(self.config);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("WebSocket relay stopping");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr, permit)) => {
                        let acceptor = acceptor.clone();
                        let config = Arc::clone(&config);
                        let revocation = Arc::clone(&self.revocation);
                        tokio::spawn(async move {
                            handle_connection(stream, peer_addr, permit, acceptor, config, revocation)
                                .await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Accept failed");
                    }
                },
            }
        }
    }
}

/// Handle one connection from TLS handshake through session teardown.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    permit: ConnectionPermit,
    acceptor: TlsAcceptor,
    config: Arc<WsProxyConfig>,
    revocation: Arc<dyn RevocationStore>,
) {
    let _permit = permit;
    let conn_id = ConnectionId::new();

    let tls_stream = match acceptor.accept(stream).await {
        Ok(s) => s,
        Err(e) => {
            tracing::debug!(
                connection_id = %conn_id,
                peer_addr = %peer_addr,
                error = %e,
                "TLS handshake failed"
            );
            return;
        }
    };

    let auth = {
        let (_, connection) = tls_stream.get_ref();
        ClientAuth::from_peer_certs(conn_id, connection.peer_certificates())
    };

    // The upgrade callback refuses unauthenticated peers and captures the
    // request target for the destination rule.
    let captured_target: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let captured_target_cb = Arc::clone(&captured_target);
    let authorized = auth.identity.is_some();

    let callback = move |req: &UpgradeRequest,
                         response: UpgradeResponse|
          -> Result<UpgradeResponse, ErrorResponse> {
        if let Ok(mut guard) = captured_target_cb.lock() {
            *guard = req
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string());
        }

        if !authorized {
            let mut refusal = ErrorResponse::new(Some(
                "Client certificate authentication failed".to_string(),
            ));
            *refusal.status_mut() = StatusCode::UNAUTHORIZED;
            return Err(refusal);
        }

        Ok(response)
    };

    let mut client_ws = match tokio_tungstenite::accept_hdr_async(tls_stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::warn!(
                connection_id = %conn_id,
                peer_addr = %peer_addr,
                error = %e,
                "Upgrade refused"
            );
            return;
        }
    };

    // The gate passed, so an identity is present.
    let identity = match auth.identity {
        Some(identity) => identity,
        None => return,
    };

    let session_id = Uuid::new_v4();

    // One revocation query per session, before the outbound leg exists.
    if revocation.is_revoked(&identity.serial) {
        tracing::warn!(
            session_id = %session_id,
            subject = %identity.common_name,
            serial = %identity.serial,
            "Certificate revoked, session refused"
        );
        let _ = client_ws
            .close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: REVOKED_REASON.into(),
            }))
            .await;
        return;
    }

    let request_target = captured_target.lock().ok().and_then(|guard| guard.clone());
    let destination = destination_url(&config.target_url, request_target.as_deref());

    tracing::info!(
        session_id = %session_id,
        subject = %identity.common_name,
        issuer = %identity.issuer,
        valid_until = identity.not_after,
        destination = %destination,
        "Opening proxy session"
    );

    let target_ws = match tokio_tungstenite::connect_async(destination.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            tracing::error!(
                session_id = %session_id,
                destination = %destination,
                error = %e,
                "Target connection failed"
            );
            let _ = client_ws
                .close(Some(CloseFrame {
                    code: CloseCode::Error,
                    reason: session::TARGET_ERROR_REASON.into(),
                }))
                .await;
            return;
        }
    };

    session::relay(session_id, client_ws, target_ws).await;
}

/// Resolve the outbound destination for a session.
///
/// The inbound path and query are appended to the target base URL only when
/// the request carries a non-empty query string; otherwise the connection
/// goes to the bare target URL and the inbound path is ignored.
fn destination_url(base: &str, request_target: Option<&str>) -> String {
    match request_target {
        Some(path_and_query) => match path_and_query.split_once('?') {
            Some((_, query)) if !query.is_empty() => format!("{}{}", base, path_and_query),
            _ => base.to_string(),
        },
        None => base.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "ws://127.0.0.1:8188";

    #[test]
    fn bare_path_connects_to_bare_target() {
        assert_eq!(destination_url(BASE, Some("/session/42")), BASE);
        assert_eq!(destination_url(BASE, Some("/")), BASE);
        assert_eq!(destination_url(BASE, None), BASE);
    }

    #[test]
    fn empty_query_counts_as_absent() {
        assert_eq!(destination_url(BASE, Some("/session?")), BASE);
    }

    #[test]
    fn query_string_carries_path_and_query() {
        assert_eq!(
            destination_url(BASE, Some("/session?client=abc")),
            "ws://127.0.0.1:8188/session?client=abc"
        );
        assert_eq!(
            destination_url(BASE, Some("/?x=1")),
            "ws://127.0.0.1:8188/?x=1"
        );
    }
}
