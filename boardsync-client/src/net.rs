//! WebSocket connection to the coordination server.
//!
//! [`BoardClient`] owns the socket: it performs the hello handshake, splits
//! the stream, and runs a background reader task that forwards decoded
//! server messages into a channel. The caller drives [`BoardClient::recv`]
//! and feeds the results into a [`crate::view::BoardView`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use boardsync_proto::codec::CodecError;
use boardsync_proto::ids::SessionId;
use boardsync_proto::wire::{self, ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<
    WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Type alias for the read half of a WebSocket connection.
type WsReader =
    futures_util::stream::SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Default timeout for connecting to the server.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for waiting for the `Welcome` acknowledgment.
const HELLO_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from the client connection.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The server URL could not be parsed or uses an unsupported scheme.
    #[error("invalid server url: {0}")]
    InvalidUrl(String),
    /// Connecting or handshaking took too long.
    #[error("operation timed out")]
    Timeout,
    /// The connection is down or closed mid-operation.
    #[error("connection closed")]
    ConnectionClosed,
    /// The hello handshake failed.
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// A wire message could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Underlying socket failure.
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Connected client session to the coordination server.
///
/// Created via [`BoardClient::connect`], which establishes the WebSocket
/// connection, completes the hello handshake, and spawns a background
/// reader task.
pub struct BoardClient {
    session_id: SessionId,
    user_id: String,
    server_url: String,
    /// Write half of the WebSocket connection (shared for concurrent sends).
    ws_sender: Arc<Mutex<WsSender>>,
    /// Channel for messages received from the background reader task.
    incoming: Mutex<mpsc::Receiver<ServerMessage>>,
    /// Whether the WebSocket connection is active.
    connected: Arc<AtomicBool>,
    /// Handle to the background reader task; aborted on drop so the read
    /// half (and with it the TCP connection) is released.
    reader_handle: tokio::task::JoinHandle<()>,
}

impl BoardClient {
    /// Connects to a coordination server and announces this session.
    ///
    /// Performs the following steps:
    /// 1. Establishes a WebSocket connection to `server_url` (10s timeout)
    /// 2. Sends `Hello` with a fresh [`SessionId`] and `user_id`
    /// 3. Waits for the `Welcome` acknowledgment (5s timeout)
    /// 4. Spawns a background task reading incoming pushes
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidUrl`] for an unparseable or non-ws URL.
    /// - [`ClientError::Timeout`] if connecting or the handshake times out.
    /// - [`ClientError::Handshake`] if the server answers with anything but
    ///   a matching `Welcome`.
    /// - [`ClientError::ConnectionClosed`] if the server hangs up mid-way.
    pub async fn connect(server_url: &str, user_id: &str) -> Result<Self, ClientError> {
        let parsed =
            url::Url::parse(server_url).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        let (ws_stream, _response) =
            tokio::time::timeout(CONNECT_TIMEOUT, connect_async(server_url))
                .await
                .map_err(|_| {
                    tracing::warn!(url = server_url, "WebSocket connect timed out");
                    ClientError::Timeout
                })?
                .map_err(|e| {
                    tracing::warn!(url = server_url, err = %e, "WebSocket connect failed");
                    ClientError::Handshake(e.to_string())
                })?;

        let (mut ws_sender, mut ws_reader) = ws_stream.split();

        let session_id = SessionId::new();
        let hello = ClientMessage::Hello {
            session_id,
            user_id: user_id.to_string(),
        };
        let bytes = wire::encode_client(&hello)?;
        ws_sender
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "failed to send Hello");
                ClientError::Handshake(format!("failed to send Hello: {e}"))
            })?;

        let ack = tokio::time::timeout(HELLO_TIMEOUT, ws_reader.next())
            .await
            .map_err(|_| {
                tracing::warn!(url = server_url, "Welcome acknowledgment timed out");
                ClientError::Timeout
            })?;

        match ack {
            Some(Ok(Message::Binary(data))) => match wire::decode_server(&data) {
                Ok(ServerMessage::Welcome {
                    session_id: echoed,
                }) if echoed == session_id => {
                    tracing::info!(session_id = %session_id, url = server_url, "session established");
                }
                Ok(other) => {
                    tracing::warn!(?other, "unexpected response during handshake");
                    return Err(ClientError::Handshake(
                        "unexpected response during handshake".to_string(),
                    ));
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed handshake response");
                    return Err(ClientError::Handshake(format!(
                        "malformed handshake response: {e}"
                    )));
                }
            },
            Some(Ok(Message::Close(_))) | None => {
                tracing::warn!("server closed connection during handshake");
                return Err(ClientError::ConnectionClosed);
            }
            Some(Ok(_)) => {
                return Err(ClientError::Handshake(
                    "unexpected non-binary frame during handshake".to_string(),
                ));
            }
            Some(Err(e)) => {
                return Err(ClientError::Handshake(format!(
                    "WebSocket error during handshake: {e}"
                )));
            }
        }

        let (tx, rx) = mpsc::channel(256);
        let connected = Arc::new(AtomicBool::new(true));
        let reader_connected = Arc::clone(&connected);
        let reader_handle = tokio::spawn(reader_loop(ws_reader, tx, reader_connected));

        Ok(Self {
            session_id,
            user_id: user_id.to_string(),
            server_url: server_url.to_string(),
            ws_sender: Arc::new(Mutex::new(ws_sender)),
            incoming: Mutex::new(rx),
            connected,
            reader_handle,
        })
    }

    /// This connection's session identifier.
    #[must_use]
    pub const fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// The identity this session announced.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The server URL this client is connected to.
    #[must_use]
    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Whether the connection is still up.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Sends a request to the server.
    ///
    /// # Errors
    ///
    /// - [`ClientError::ConnectionClosed`] if the connection is down.
    /// - [`ClientError::Codec`] if the message cannot be encoded.
    pub async fn send(&self, msg: &ClientMessage) -> Result<(), ClientError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(ClientError::ConnectionClosed);
        }
        let bytes = wire::encode_client(msg)?;
        let mut sender = self.ws_sender.lock().await;
        sender
            .send(Message::Binary(bytes.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "send failed");
                self.connected.store(false, Ordering::Relaxed);
                ClientError::ConnectionClosed
            })?;
        Ok(())
    }

    /// Receives the next server message, blocking until one arrives.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::ConnectionClosed`] once the connection is
    /// lost (the background reader task has exited).
    pub async fn recv(&self) -> Result<ServerMessage, ClientError> {
        let mut rx = self.incoming.lock().await;
        rx.recv().await.ok_or(ClientError::ConnectionClosed)
    }
}

/// The reader task owns the read half of the socket, so it must be aborted
/// when the client goes away; otherwise the TCP connection stays open and
/// the server never observes the disconnect.
impl Drop for BoardClient {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::Relaxed);
        self.reader_handle.abort();
    }
}

/// Background task that reads WebSocket frames and forwards decoded server
/// messages. Malformed frames are logged and skipped; the task does not
/// disconnect on bad data. Sets `connected` to `false` when the socket
/// closes or errors out.
async fn reader_loop(
    mut ws_reader: WsReader,
    tx: mpsc::Sender<ServerMessage>,
    connected: Arc<AtomicBool>,
) {
    while let Some(msg_result) = ws_reader.next().await {
        match msg_result {
            Ok(Message::Binary(data)) => match wire::decode_server(&data) {
                Ok(msg) => {
                    if tx.send(msg).await.is_err() {
                        // Receiver dropped, the client was dropped. Exit.
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(err = %e, "malformed server frame, skipping");
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("WebSocket closed by server");
                break;
            }
            Ok(_) => {
                // Ignore ping/pong/text frames.
            }
            Err(e) => {
                tracing::warn!(err = %e, "WebSocket read error");
                break;
            }
        }
    }
    connected.store(false, Ordering::Relaxed);
    tracing::debug!("reader task exiting");
}
