//! Bidirectional message pumping for one proxy session.
//!
//! A session is the ordered pair {client socket, target socket}. Each socket
//! gets a writer task fed by a bounded channel; two symmetric pumps read
//! from one socket and forward to the other side's writer. The channel keeps
//! message order strict FIFO per direction. There is no ordering guarantee
//! between the two directions, and none is needed.
//!
//! Closure protocol:
//!
//! | Trigger                    | Action                                    |
//! |----------------------------|-------------------------------------------|
//! | Client closes (any code)   | Close target with default code            |
//! | Target closes (any code)   | Close client with default code            |
//! | Error on target connection | Close client 1011 "Target connection error" |
//! | Error on client connection | Close target (no explicit code)           |

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use uuid::Uuid;

/// Close reason sent to the client when the target side fails.
pub const TARGET_ERROR_REASON: &str = "Target connection error";

/// Per-message channel depth for each writer task.
const WRITER_QUEUE_DEPTH: usize = 32;

/// Lifecycle state of one socket in a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl SocketState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SocketState::Connecting,
            1 => SocketState::Open,
            2 => SocketState::Closing,
            _ => SocketState::Closed,
        }
    }
}

/// Shared, atomically updated socket state.
#[derive(Debug, Clone)]
pub struct SocketStatus(Arc<AtomicU8>);

impl SocketStatus {
    pub fn new(state: SocketState) -> Self {
        Self(Arc::new(AtomicU8::new(state as u8)))
    }

    pub fn get(&self) -> SocketState {
        SocketState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn set(&self, state: SocketState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

/// Commands accepted by a socket's writer task.
enum WriterCommand {
    /// Forward a message if the socket is Open; drop it otherwise.
    Forward(Message),
    /// Send a close frame (None = default code) and stop writing.
    Shutdown(Option<CloseFrame>),
}

/// How a pump ended, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpEnd {
    SourceClosed,
    SourceError,
}

/// Run one session to completion.
///
/// Both sockets must be open when this is called; the session ends when
/// both directions have terminated, with the closure protocol applied.
pub async fn relay<C, T>(
    session_id: Uuid,
    client: WebSocketStream<C>,
    target: WebSocketStream<T>,
) where
    C: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let client_status = SocketStatus::new(SocketState::Open);
    let target_status = SocketStatus::new(SocketState::Open);

    let (client_sink, client_stream) = client.split();
    let (target_sink, target_stream) = target.split();

    let client_tx = spawn_writer(client_sink, client_status.clone(), "client", session_id);
    let target_tx = spawn_writer(target_sink, target_status.clone(), "target", session_id);

    // Client side ending (close or error) closes the target with the
    // default code; a target-side error closes the client with 1011.
    let client_to_target = pump(
        client_stream,
        target_tx,
        client_status,
        None,
        "client->target",
        session_id,
    );
    let target_to_client = pump(
        target_stream,
        client_tx,
        target_status,
        Some(CloseFrame {
            code: CloseCode::Error,
            reason: TARGET_ERROR_REASON.into(),
        }),
        "target->client",
        session_id,
    );

    let _ = tokio::join!(client_to_target, target_to_client);

    tracing::info!(session_id = %session_id, "Session closed");
}

/// Spawn the writer task owning one socket's sink half.
///
/// The writer checks its socket's state before each forward: a message for
/// a socket that is not Open is silently dropped, never queued or retried.
fn spawn_writer<W>(
    mut sink: W,
    status: SocketStatus,
    side: &'static str,
    session_id: Uuid,
) -> mpsc::Sender<WriterCommand>
where
    W: SinkExt<Message, Error = WsError> + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel(WRITER_QUEUE_DEPTH);

    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            match command {
                WriterCommand::Forward(message) => {
                    if status.get() != SocketState::Open {
                        tracing::trace!(
                            session_id = %session_id,
                            side,
                            "Destination not open, message dropped"
                        );
                        continue;
                    }
                    if sink.send(message).await.is_err() {
                        status.set(SocketState::Closed);
                    }
                }
                WriterCommand::Shutdown(frame) => {
                    status.set(SocketState::Closing);
                    let _ = sink.send(Message::Close(frame)).await;
                    let _ = sink.flush().await;
                    status.set(SocketState::Closed);
                    break;
                }
            }
        }
    });

    tx
}

/// Forward messages from one socket to the other side's writer until the
/// source closes or errors, then apply the closure protocol.
async fn pump<R>(
    mut reader: R,
    dest: mpsc::Sender<WriterCommand>,
    source_status: SocketStatus,
    error_close: Option<CloseFrame>,
    direction: &'static str,
    session_id: Uuid,
) -> PumpEnd
where
    R: StreamExt<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        match reader.next().await {
            Some(Ok(Message::Close(frame))) => {
                tracing::debug!(
                    session_id = %session_id,
                    direction,
                    code = ?frame.as_ref().map(|f| f.code),
                    "Peer closed"
                );
                source_status.set(SocketState::Closed);
                let _ = dest.send(WriterCommand::Shutdown(None)).await;
                return PumpEnd::SourceClosed;
            }
            Some(Ok(message)) => {
                // Text and binary payloads cross unmodified, frame type
                // preserved; ping/pong relay transparently. A dead writer
                // means the destination is gone and the message is dropped.
                let _ = dest.send(WriterCommand::Forward(message)).await;
            }
            Some(Err(e)) => {
                tracing::debug!(
                    session_id = %session_id,
                    direction,
                    error = %e,
                    "Read error, closing session"
                );
                source_status.set(SocketState::Closed);
                let _ = dest.send(WriterCommand::Shutdown(error_close)).await;
                return PumpEnd::SourceError;
            }
            None => {
                source_status.set(SocketState::Closed);
                let _ = dest.send(WriterCommand::Shutdown(None)).await;
                return PumpEnd::SourceClosed;
            }
        }
    }
}
