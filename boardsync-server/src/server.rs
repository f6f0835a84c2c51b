//! Server core: shared state, WebSocket handler, and message dispatch.
//!
//! Accepts WebSocket connections, registers sessions by [`SessionId`], and
//! dispatches board joins, move requests, and snapshot requests. Direct
//! responses go back on the requester's channel; room-wide pushes fan out
//! through the [`RoomBroadcaster`].

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use boardsync_proto::ids::{BoardId, ColumnId, SessionId, TaskId};
use boardsync_proto::wire::{self, ClientMessage, ServerMessage};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::coordinator::BoardCoordinator;
use crate::rooms::RoomBroadcaster;
use crate::store::BoardStore;

/// Default maximum allowed frame size in bytes (64 KB).
const DEFAULT_MAX_FRAME_SIZE: usize = 64 * 1024;

/// Shared server state: the store, the coordinator that commits against it,
/// and the room broadcaster.
pub struct ServerState {
    /// Authoritative task position store.
    pub store: Arc<BoardStore>,
    /// Single writer path for orderings.
    pub coordinator: BoardCoordinator,
    /// Room membership and push fan-out.
    pub rooms: RoomBroadcaster,
    /// Maximum allowed inbound frame size in bytes.
    max_frame_size: usize,
}

impl Default for ServerState {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerState {
    /// Creates server state over a fresh, empty store with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(Arc::new(BoardStore::new()))
    }

    /// Creates server state over an existing store with default limits.
    #[must_use]
    pub fn with_store(store: Arc<BoardStore>) -> Self {
        Self {
            coordinator: BoardCoordinator::new(Arc::clone(&store)),
            store,
            rooms: RoomBroadcaster::new(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Creates server state from a resolved [`ServerConfig`].
    #[must_use]
    pub fn from_config(config: &ServerConfig) -> Self {
        let store = Arc::new(BoardStore::new());
        Self {
            coordinator: BoardCoordinator::with_retry_limit(
                Arc::clone(&store),
                config.move_retry_limit,
            ),
            store,
            rooms: RoomBroadcaster::new(),
            max_frame_size: config.max_frame_size,
        }
    }
}

/// Handles an upgraded WebSocket connection for a single session.
///
/// The connection lifecycle:
/// 1. Wait for a `Hello` message.
/// 2. Register the session and send `Welcome` back.
/// 3. Spawn a writer task draining the session's outbound channel.
/// 4. Enter the message loop, dispatching client requests.
/// 5. On disconnect, remove the session and notify its room.
pub async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let Some((session_id, user_id)) = wait_for_hello(&mut ws_receiver).await else {
        tracing::warn!("connection closed before hello");
        return;
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    state.rooms.register(session_id, &user_id, tx).await;

    let welcome = ServerMessage::Welcome { session_id };
    if let Err(e) = send_direct(&mut ws_sender, &welcome).await {
        tracing::error!(session_id = %session_id, error = %e, "failed to send welcome");
        state.rooms.disconnect(session_id).await;
        return;
    }
    tracing::info!(session_id = %session_id, user_id = %user_id, "session registered");

    // Writer task: forwards typed messages from the channel to the socket.
    // Encoding happens here, off the broadcast path.
    let mut write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match wire::encode_server(&msg) {
                Ok(bytes) => {
                    if ws_sender.send(Message::Binary(bytes.into())).await.is_err() {
                        tracing::warn!(session_id = %session_id, "WebSocket write failed");
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "failed to encode push");
                }
            }
        }
    });

    // Reader loop: dispatch incoming requests from this session.
    let reader_state = Arc::clone(&state);
    let reader_user = user_id.clone();
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Binary(data) => {
                    handle_binary_message(session_id, &reader_user, &data, &reader_state).await;
                }
                Message::Close(_) => {
                    tracing::info!(session_id = %session_id, "received close frame");
                    break;
                }
                _ => {
                    // Ignore text, ping, pong frames.
                }
            }
        }
    });

    // Wait for either task to finish, then abort the other.
    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    // Clean up: remove the session and tell its room it left.
    if let Some((board_id, user_id)) = state.rooms.disconnect(session_id).await {
        state
            .rooms
            .publish(board_id, &ServerMessage::ViewerLeft { board_id, user_id }, None)
            .await;
    }
    tracing::info!(session_id = %session_id, "session disconnected");
}

/// Waits for the first message on the WebSocket, expecting a `Hello`.
///
/// Returns the session identity if a valid `Hello` arrives, or `None` if
/// the connection closes or sends something else first.
async fn wait_for_hello(
    receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
) -> Option<(SessionId, String)> {
    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => match wire::decode_client(&data) {
                Ok(ClientMessage::Hello {
                    session_id,
                    user_id,
                }) => {
                    if user_id.is_empty() {
                        tracing::warn!("received Hello with empty user_id");
                        return None;
                    }
                    return Some((session_id, user_id));
                }
                Ok(other) => {
                    tracing::warn!(msg = ?other, "expected Hello, got different message");
                    return None;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to decode hello message");
                    return None;
                }
            },
            Message::Close(_) => return None,
            _ => {
                // Skip non-binary frames (ping/pong) before hello.
            }
        }
    }
    None
}

/// Handles a binary WebSocket frame from a registered session.
async fn handle_binary_message(
    session_id: SessionId,
    user_id: &str,
    data: &[u8],
    state: &Arc<ServerState>,
) {
    if data.len() > state.max_frame_size {
        tracing::warn!(
            session_id = %session_id,
            size = data.len(),
            max = state.max_frame_size,
            "frame exceeds size limit"
        );
        let err = ServerMessage::Error {
            reason: format!(
                "frame too large: {} bytes (max {})",
                data.len(),
                state.max_frame_size
            ),
        };
        state.rooms.send(session_id, err).await;
        return;
    }

    let msg = match wire::decode_client(data) {
        Ok(m) => m,
        Err(e) => {
            tracing::warn!(session_id = %session_id, error = %e, "failed to decode message");
            state
                .rooms
                .send(
                    session_id,
                    ServerMessage::Error {
                        reason: format!("undecodable frame: {e}"),
                    },
                )
                .await;
            return;
        }
    };

    match msg {
        ClientMessage::JoinBoard { board_id } => {
            handle_join(session_id, user_id, board_id, state).await;
        }
        ClientMessage::LeaveBoard { board_id } => {
            if state.rooms.leave(session_id, board_id).await {
                tracing::info!(session_id = %session_id, board_id = %board_id, "left board");
                let left = ServerMessage::ViewerLeft {
                    board_id,
                    user_id: user_id.to_string(),
                };
                state.rooms.publish(board_id, &left, None).await;
            }
        }
        ClientMessage::MoveTask {
            task_id,
            target_column_id,
            target_index,
        } => {
            handle_move(session_id, user_id, task_id, target_column_id, target_index, state)
                .await;
        }
        ClientMessage::RequestSnapshot { board_id } => {
            let response = match state.store.snapshot(board_id).await {
                Ok(snapshot) => ServerMessage::Snapshot { board_id, snapshot },
                Err(e) => ServerMessage::Error {
                    reason: e.to_string(),
                },
            };
            state.rooms.send(session_id, response).await;
        }
        ClientMessage::Hello { .. } => {
            tracing::warn!(session_id = %session_id, "duplicate Hello from registered session");
        }
    }
}

/// Join flow: validate the board, switch rooms, answer with the current
/// snapshot, then announce the arrival to the rest of the room.
async fn handle_join(
    session_id: SessionId,
    user_id: &str,
    board_id: BoardId,
    state: &Arc<ServerState>,
) {
    // Snapshot first: an unknown board must not change room membership.
    let snapshot = match state.store.snapshot(board_id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            tracing::warn!(session_id = %session_id, board_id = %board_id, error = %e, "join failed");
            state
                .rooms
                .send(
                    session_id,
                    ServerMessage::Error {
                        reason: e.to_string(),
                    },
                )
                .await;
            return;
        }
    };

    if let Some(previous) = state.rooms.join(session_id, board_id).await {
        let left = ServerMessage::ViewerLeft {
            board_id: previous,
            user_id: user_id.to_string(),
        };
        state.rooms.publish(previous, &left, None).await;
    }
    tracing::info!(session_id = %session_id, board_id = %board_id, "joined board");

    state
        .rooms
        .send(session_id, ServerMessage::BoardJoined { board_id, snapshot })
        .await;
    let joined = ServerMessage::ViewerJoined {
        board_id,
        user_id: user_id.to_string(),
    };
    state.rooms.publish(board_id, &joined, Some(session_id)).await;
}

/// Move flow: commit through the coordinator, answer the requester
/// directly, then push the authoritative result to the rest of the room.
async fn handle_move(
    session_id: SessionId,
    user_id: &str,
    task_id: TaskId,
    target_column_id: ColumnId,
    target_index: u32,
    state: &Arc<ServerState>,
) {
    match state
        .coordinator
        .move_task(task_id, target_column_id, target_index, user_id)
        .await
    {
        Ok(outcome) => {
            let accepted = ServerMessage::MoveAccepted {
                task_id: outcome.task_id,
                column_id: outcome.column_id,
                position: outcome.position,
                affected: outcome.affected.clone(),
                moved_by: outcome.moved_by.clone(),
            };
            state.rooms.send(session_id, accepted).await;

            if let Some(board_id) = state.store.board_of_task(task_id).await {
                let moved = ServerMessage::TaskMoved {
                    task_id: outcome.task_id,
                    source_column_id: outcome.source_column_id,
                    target_column_id: outcome.column_id,
                    position: outcome.position,
                    moved_by: outcome.moved_by,
                    affected: outcome.affected,
                };
                state.rooms.publish(board_id, &moved, Some(session_id)).await;
            }
        }
        Err(e) => {
            tracing::debug!(session_id = %session_id, task_id = %task_id, error = %e, "move rejected");
            let rejected = ServerMessage::MoveRejected {
                task_id,
                reason: e.reject_reason(),
            };
            state.rooms.send(session_id, rejected).await;
        }
    }
}

/// Encodes and sends a server message directly on a WebSocket sender.
async fn send_direct(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    msg: &ServerMessage,
) -> Result<(), String> {
    let bytes = wire::encode_server(msg).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Binary(bytes.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}

/// Starts the server on the given address and returns the bound address and
/// a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    start_server_with_state(addr, Arc::new(ServerState::new())).await
}

/// Starts the server with pre-configured [`ServerState`].
///
/// Use [`ServerState::from_config`] to build state from a resolved
/// [`ServerConfig`], or [`ServerState::with_store`] to serve a pre-seeded
/// store.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<ServerState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(
    ws: axum::extract::ws::WebSocketUpgrade,
    axum::extract::State(state): axum::extract::State<Arc<ServerState>>,
) -> impl axum::response::IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}
