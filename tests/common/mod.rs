//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use rcgen::{BasicConstraints, CertificateParams, DnType, Issuer, IsCa, KeyPair, SerialNumber};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use mtls_proxy::auth::revocation::InMemoryRevocationList;
use mtls_proxy::config::ProxyConfig;
use mtls_proxy::net::{build_acceptor, Listener};
use mtls_proxy::{HttpServer, Shutdown, WsServer};

/// A request captured by the recording backend.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct RecordedRequest {
    pub method: String,
    pub target: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[allow(dead_code)]
impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Start a mock HTTP backend that records every request and answers with a
/// fixed raw response. Returns its address and the stream of recordings.
#[allow(dead_code)]
pub async fn start_recording_backend(
    response: &'static str,
) -> (SocketAddr, mpsc::UnboundedReceiver<RecordedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        if let Some(request) = read_request(&mut socket).await {
                            let _ = tx.send(request);
                        }
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, rx)
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        if buf.len() > 64 * 1024 {
            return None;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next()?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next()?.to_string();
    let target = parts.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| {
            line.split_once(':')
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        })
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(RecordedRequest {
        method,
        target,
        headers,
        body,
    })
}

/// Start a mock WebSocket backend that echoes text and binary messages.
/// Returns its address, a connection counter, and the upgrade targets seen.
#[allow(dead_code)]
pub async fn start_ws_echo_backend() -> (
    SocketAddr,
    Arc<AtomicU32>,
    mpsc::UnboundedReceiver<String>,
) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let connections = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&connections);
    let (target_tx, target_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let target_tx = target_tx.clone();
                    tokio::spawn(async move {
                        use tokio_tungstenite::tungstenite::handshake::server::{
                            ErrorResponse, Request, Response,
                        };
                        let callback = move |req: &Request,
                                             response: Response|
                              -> Result<Response, ErrorResponse> {
                            let _ = target_tx.send(req.uri().to_string());
                            Ok(response)
                        };
                        let Ok(mut ws) =
                            tokio_tungstenite::accept_hdr_async(stream, callback).await
                        else {
                            return;
                        };
                        while let Some(Ok(message)) = ws.next().await {
                            if message.is_text() || message.is_binary() {
                                if ws.send(message).await.is_err() {
                                    break;
                                }
                            } else if message.is_close() {
                                break;
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, connections, target_rx)
}

/// Throwaway PKI: a CA, a server certificate for "localhost", and client
/// certificates minted on demand.
pub struct TestPki {
    pub dir: PathBuf,
    ca: Issuer<'static, KeyPair>,
    ca_der: CertificateDer<'static>,
}

impl TestPki {
    pub fn new() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::default();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "Test Proxy CA");
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();
        let ca_pem = ca_cert.pem();
        let ca_der = ca_cert.der().clone();
        let ca = Issuer::new(ca_params, ca_key);

        let server_key = KeyPair::generate().unwrap();
        let mut server_params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
        server_params
            .distinguished_name
            .push(DnType::CommonName, "localhost");
        let server_cert = server_params.signed_by(&server_key, &ca).unwrap();

        let dir = std::env::temp_dir().join(format!("mtls-proxy-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("ca-cert.pem"), ca_pem).unwrap();
        std::fs::write(dir.join("server-cert.pem"), server_cert.pem()).unwrap();
        std::fs::write(dir.join("server-key.pem"), server_key.serialize_pem()).unwrap();

        Self { dir, ca, ca_der }
    }

    /// Configuration pointing at this PKI's files.
    pub fn tls_config(&self) -> mtls_proxy::config::TlsConfig {
        mtls_proxy::config::TlsConfig {
            cert_path: self.dir.join("server-cert.pem").display().to_string(),
            key_path: self.dir.join("server-key.pem").display().to_string(),
            ca_path: self.dir.join("ca-cert.pem").display().to_string(),
        }
    }

    /// TLS client config carrying a CA-signed client certificate.
    ///
    /// `common_name: None` mints a certificate without a subject CN, which
    /// passes chain validation but must fail the gate.
    pub fn client_config(
        &self,
        common_name: Option<&str>,
        serial: &[u8],
    ) -> Arc<rustls::ClientConfig> {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        if let Some(cn) = common_name {
            params.distinguished_name.push(DnType::CommonName, cn);
        }
        params.serial_number = Some(SerialNumber::from(serial.to_vec()));
        let cert = params.signed_by(&key, &self.ca).unwrap();

        let config = rustls::ClientConfig::builder()
            .with_root_certificates(self.root_store())
            .with_client_auth_cert(
                vec![cert.der().clone()],
                PrivateKeyDer::from(PrivatePkcs8KeyDer::from(key.serialize_der())),
            )
            .unwrap();
        Arc::new(config)
    }

    /// TLS client config with no client certificate at all.
    #[allow(dead_code)]
    pub fn anonymous_client_config(&self) -> Arc<rustls::ClientConfig> {
        Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(self.root_store())
                .with_no_client_auth(),
        )
    }

    fn root_store(&self) -> rustls::RootCertStore {
        let mut roots = rustls::RootCertStore::empty();
        roots.add(self.ca_der.clone()).unwrap();
        roots
    }
}

impl Drop for TestPki {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

/// Spawn both relays on ephemeral ports. Returns their addresses and the
/// shutdown handle keeping them alive.
#[allow(dead_code)]
pub async fn spawn_proxy(mut config: ProxyConfig) -> (SocketAddr, SocketAddr, Shutdown) {
    config.http.bind_address = "127.0.0.1:0".to_string();
    config.websocket.bind_address = "127.0.0.1:0".to_string();

    let acceptor = build_acceptor(&config.tls).unwrap();
    let revocation = Arc::new(InMemoryRevocationList::from_config(&config.revocation));

    let http_listener = Listener::bind(&config.http.bind_address, &config.listener)
        .await
        .unwrap();
    let ws_listener = Listener::bind(&config.websocket.bind_address, &config.listener)
        .await
        .unwrap();
    let http_addr = http_listener.local_addr().unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let http_server = HttpServer::new(&config).unwrap();
    let ws_server = WsServer::new(config.websocket.clone(), revocation);

    tokio::spawn(http_server.run(http_listener, acceptor.clone(), shutdown.subscribe()));
    tokio::spawn(ws_server.run(ws_listener, acceptor, shutdown.subscribe()));

    (http_addr, ws_addr, shutdown)
}

/// Issue one raw HTTP/1.1 request over mTLS and return the parsed response.
#[allow(dead_code)]
pub async fn https_request(
    addr: SocketAddr,
    tls: Arc<rustls::ClientConfig>,
    raw: &str,
) -> Result<(u16, Vec<(String, String)>, Vec<u8>), std::io::Error> {
    let tcp = TcpStream::connect(addr).await?;
    let connector = tokio_rustls::TlsConnector::from(tls);
    let server_name = rustls::pki_types::ServerName::try_from("localhost".to_string()).unwrap();
    let mut stream = connector.connect(server_name, tcp).await?;

    stream.write_all(raw.as_bytes()).await?;
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;

    let head_end = buf
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "no response head"))?;

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "no status code"))?;
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| {
            line.split_once(':')
                .map(|(k, v)| (k.trim().to_lowercase(), v.trim().to_string()))
        })
        .collect();
    let body = buf[head_end + 4..].to_vec();

    Ok((status, headers, body))
}
