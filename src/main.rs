//! Mutually-authenticated reverse proxy pair.
//!
//! Two TLS listeners in front of one backend service:
//!
//! ```text
//!                               ┌───────────────────────────────────────┐
//!                               │              mTLS PROXY               │
//!                               │                                       │
//!     HTTPS (client cert) ──────┼─▶ gate ─▶ HTTP relay ────────────────▶│──── Backend HTTP
//!                               │                                       │
//!     WSS (client cert) ────────┼─▶ gate ─▶ revocation ─▶ WS relay ◀──▶ │──── Backend WS
//!                               │                                       │
//!                               │  config · tls · lifecycle · tracing   │
//!                               └───────────────────────────────────────┘
//! ```
//!
//! The handshake refuses peers without a CA-validated client certificate;
//! the gate re-checks authorization before any relay logic runs. Both
//! listeners stop accepting on SIGTERM/SIGINT and the process exits 0.

// Core subsystems
pub mod auth;
pub mod config;
pub mod http;
pub mod net;
pub mod ws;

// Cross-cutting concerns
pub mod lifecycle;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::auth::revocation::InMemoryRevocationList;
use crate::config::{load_config, ProxyConfig};
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::net::{build_acceptor, Listener};
use crate::ws::WsServer;

/// Mutually-authenticated reverse proxy for HTTP and WebSocket traffic.
#[derive(Debug, Parser)]
#[command(name = "mtls-proxy", version)]
struct Args {
    /// Path to the TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "mtls_proxy={},tower_http=info",
                    config.observability.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("mtls-proxy v0.1.0 starting");

    tracing::info!(
        http_bind = %config.http.bind_address,
        ws_bind = %config.websocket.bind_address,
        backend = %config.http.backend_base_url,
        ws_target = %config.websocket.target_url,
        "Configuration loaded"
    );

    // TLS material and the revocation snapshot are built once, before
    // serving begins; failure here is fatal.
    let acceptor = build_acceptor(&config.tls)?;
    let revocation = Arc::new(InMemoryRevocationList::from_config(&config.revocation));

    let http_listener = Listener::bind(&config.http.bind_address, &config.listener).await?;
    let ws_listener = Listener::bind(&config.websocket.bind_address, &config.listener).await?;

    let shutdown = Shutdown::new();

    let http_server = HttpServer::new(&config)?;
    let ws_server = WsServer::new(config.websocket.clone(), revocation);

    let http_task = tokio::spawn(http_server.run(
        http_listener,
        acceptor.clone(),
        shutdown.subscribe(),
    ));
    let ws_task = tokio::spawn(ws_server.run(ws_listener, acceptor, shutdown.subscribe()));

    lifecycle::wait_for_termination().await;
    shutdown.trigger();

    let _ = http_task.await;
    let _ = ws_task.await;

    tracing::info!("Shutdown complete");
    Ok(())
}
