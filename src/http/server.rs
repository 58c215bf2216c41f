//! HTTP relay server setup.
//!
//! # Responsibilities
//! - Accept TLS connections (client certificate verified during handshake)
//! - Run the post-handshake gate and inject the outcome per connection
//! - Dispatch requests through the Axum router to the forwarding handler
//! - Forward requests to the backend and shape responses
//!
//! # Design Decisions
//! - Each request is a single independent attempt: no retries, no timeout,
//!   no cross-request state
//! - The forwarding client follows no redirects and decodes no compression;
//!   the client sees exactly what the backend returned

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::{HeaderValue, CONTENT_LENGTH},
    http::{StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioIo},
    server::conn::auto,
};
use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tower_http::trace::TraceLayer;

use crate::auth::gate::{require_client_cert, ClientAuth};
use crate::config::ProxyConfig;
use crate::http::request::{build_target_uri, filter_request_headers};
use crate::http::response::{filter_response_headers, ResponseShape};
use crate::net::{ConnectionId, ConnectionPermit, Listener};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    client: Client<HttpConnector, Body>,
    backend_base: String,
    backend_authority: HeaderValue,
}

/// Error type for HTTP relay setup.
#[derive(Debug, thiserror::Error)]
pub enum HttpServerError {
    #[error("invalid backend base URL '{0}'")]
    InvalidBackendUrl(String),
}

/// TLS server for the HTTP relay.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP relay from the given configuration.
    pub fn new(config: &ProxyConfig) -> Result<Self, HttpServerError> {
        let base = config.http.backend_base_url.clone();

        let authority = base
            .parse::<Uri>()
            .ok()
            .and_then(|uri| uri.authority().cloned())
            .ok_or_else(|| HttpServerError::InvalidBackendUrl(base.clone()))?;
        let backend_authority = HeaderValue::from_str(authority.as_str())
            .map_err(|_| HttpServerError::InvalidBackendUrl(base.clone()))?;

        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        let state = AppState {
            client,
            backend_base: base,
            backend_authority,
        };

        Ok(Self {
            router: Self::build_router(state),
        })
    }

    /// Build the Axum router: every method and path goes through the gate,
    /// then the forwarding handler.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(relay_handler))
            .route("/", any(relay_handler))
            .with_state(state)
            .layer(middleware::from_fn(require_client_cert))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the relay until the shutdown signal fires.
    ///
    /// On shutdown the accept loop stops and the listening socket is
    /// dropped; in-flight connections finish on their own tasks.
    pub async fn run(
        self,
        listener: Listener,
        acceptor: TlsAcceptor,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(address = %addr, "HTTP relay listening");
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("HTTP relay stopping");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer_addr, permit)) => {
                        let acceptor = acceptor.clone();
                        let router = self.router.clone();
                        tokio::spawn(async move {
                            handle_connection(stream, peer_addr, permit, acceptor, router).await;
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

/// Serve one TLS connection: handshake, gate, then HTTP dispatch.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    permit: ConnectionPermit,
    acceptor: TlsAcceptor,
    router: Router,
) {
    let _permit = permit;
    let conn_id = ConnectionId::new();

    // Handshake failure (including a missing or untrusted client
    // certificate) rejects the connection before any relay logic runs.
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

    let service = hyper::service::service_fn(move |mut request: hyper::Request<Incoming>| {
        request.extensions_mut().insert(auth.clone());
        router.clone().oneshot(request.map(Body::new))
    });

    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection_with_upgrades(TokioIo::new(tls_stream), service)
        .await
    {
        tracing::debug!(connection_id = %conn_id, error = %e, "Connection ended with error");
    }
}

/// Error type for a single forwarding attempt. Every variant surfaces to
/// the client as a 500 with a generic error body.
#[derive(Debug, thiserror::Error)]
enum RelayError {
    #[error("invalid target URL: {0}")]
    TargetUri(#[from] axum::http::uri::InvalidUri),

    #[error("failed to read request body: {0}")]
    RequestBody(axum::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read upstream body: {0}")]
    ResponseBody(axum::Error),

    #[error("upstream body claimed JSON but failed to parse: {0}")]
    Json(#[from] serde_json::Error),

    #[error("failed to assemble message: {0}")]
    Http(#[from] axum::http::Error),
}

/// Forwarding handler: one inbound request, one backend attempt.
async fn relay_handler(State(state): State<AppState>, request: Request) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match forward(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(
                method = %method,
                path = %path,
                error = %e,
                "Proxy request failed"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "Proxy request failed" })),
            )
                .into_response()
        }
    }
}

/// Construct the outbound request, issue it, and shape the response.
async fn forward(state: &AppState, request: Request) -> Result<Response, RelayError> {
    let (parts, body) = request.into_parts();

    let target_uri = build_target_uri(&state.backend_base, &parts.uri)?;

    // The request body crosses unmodified, whatever its size.
    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(RelayError::RequestBody)?;

    let mut outbound = hyper::Request::builder()
        .method(parts.method)
        .uri(target_uri)
        .body(Body::from(body_bytes))?;
    *outbound.headers_mut() = filter_request_headers(&parts.headers, &state.backend_authority);

    let response = state.client.request(outbound).await?;
    let (backend_parts, backend_body) = response.into_parts();

    let shape = ResponseShape::from_headers(&backend_parts.headers);
    let collected = axum::body::to_bytes(Body::new(backend_body), usize::MAX)
        .await
        .map_err(RelayError::ResponseBody)?;
    let shaped = shape.apply(collected)?;

    let mut headers = filter_response_headers(&backend_parts.headers);
    // The JSON path can change the byte length; re-frame for both paths.
    headers.insert(CONTENT_LENGTH, HeaderValue::from(shaped.len()));

    let mut response = Response::builder()
        .status(backend_parts.status)
        .body(Body::from(shaped))?;
    *response.headers_mut() = headers;

    Ok(response)
}
