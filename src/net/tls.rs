//! TLS configuration and certificate loading.
//!
//! # Responsibilities
//! - Load server certificate chain, private key, and client CA bundle (PEM)
//! - Build a rustls `ServerConfig` with mandatory client-certificate
//!   verification against the CA roots
//! - Produce the `TlsAcceptor` shared by both listeners
//!
//! # Design Decisions
//! - Client auth is not optional: a peer without a CA-validated certificate
//!   fails the handshake before any application code runs
//! - Any error here is fatal at startup; the process must not begin serving

use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use rustls_pemfile::{certs, private_key};
use tokio_rustls::TlsAcceptor;

use crate::config::TlsConfig;

/// Error type for TLS setup.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    EmptyCertChain(String),

    #[error("no private key found in {0}")]
    EmptyPrivateKey(String),

    #[error("no usable CA certificates in {0}")]
    EmptyCaBundle(String),

    #[error("invalid client verifier: {0}")]
    Verifier(String),

    #[error("invalid server certificate or key: {0}")]
    Config(#[from] rustls::Error),
}

impl TlsError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

/// Build the mTLS acceptor from configured certificate paths.
pub fn build_acceptor(config: &TlsConfig) -> Result<TlsAcceptor, TlsError> {
    let cert_chain = load_cert_chain(Path::new(&config.cert_path))?;
    let key = load_private_key(Path::new(&config.key_path))?;

    let ca_certs = load_cert_chain(Path::new(&config.ca_path))?;
    let mut roots = RootCertStore::empty();
    let (added, _) = roots.add_parsable_certificates(ca_certs);
    if added == 0 {
        return Err(TlsError::EmptyCaBundle(config.ca_path.clone()));
    }

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| TlsError::Verifier(e.to_string()))?;

    let server_config = ServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(cert_chain, key)?;

    tracing::info!(
        cert = %config.cert_path,
        ca = %config.ca_path,
        "TLS configured with mandatory client certificates"
    );

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader =
        std::io::BufReader::new(std::fs::File::open(path).map_err(|e| TlsError::io(path, e))?);
    let cert_chain = certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsError::io(path, e))?;
    if cert_chain.is_empty() {
        return Err(TlsError::EmptyCertChain(path.display().to_string()));
    }
    Ok(cert_chain)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader =
        std::io::BufReader::new(std::fs::File::open(path).map_err(|e| TlsError::io(path, e))?);
    let key = private_key(&mut reader)
        .map_err(|e| TlsError::io(path, e))?
        .ok_or_else(|| TlsError::EmptyPrivateKey(path.display().to_string()))?;
    Ok(key)
}
