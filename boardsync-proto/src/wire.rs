//! Request, response, and push messages exchanged between board viewers
//! and the coordination server.
//!
//! All messages are postcard-encoded binary WebSocket frames. A connection
//! starts with [`ClientMessage::Hello`] and a [`ServerMessage::Welcome`]
//! acknowledgment; after that the client may join one board room at a time
//! and issue move requests against it.

use serde::{Deserialize, Serialize};

use crate::board::{BoardSnapshot, ColumnOrder, MoveRejectReason};
use crate::codec::{self, CodecError};
use crate::ids::{BoardId, ColumnId, SessionId, TaskId};

/// Messages sent by a board viewer to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// First message on every connection: announce the session identity.
    ///
    /// `user_id` is an opaque, already-validated identity from the
    /// authentication layer; the server records it for echo suppression
    /// and presence notifications, it does not authenticate here.
    Hello {
        /// This connection's session identifier.
        session_id: SessionId,
        /// Authenticated user identity.
        user_id: String,
    },
    /// Subscribe to a board's room. Implicitly leaves the previous room
    /// if the session was in one; a session views at most one board.
    JoinBoard {
        /// Board to join.
        board_id: BoardId,
    },
    /// Unsubscribe from a board's room. Idempotent.
    LeaveBoard {
        /// Board to leave.
        board_id: BoardId,
    },
    /// Request a task reposition.
    ///
    /// `target_index` is the 0-based index the task should occupy in the
    /// target column's post-move ordering, counted among the column's other
    /// active tasks. It is not a raw position value; the server derives the
    /// persisted position, which keeps racing requests self-correcting.
    MoveTask {
        /// Task to move.
        task_id: TaskId,
        /// Destination column (may equal the current column for a reorder).
        target_column_id: ColumnId,
        /// Requested index in the target column's post-move ordering.
        target_index: u32,
    },
    /// Request a full board snapshot, used to resynchronize after a
    /// connection gap instead of replaying missed events.
    RequestSnapshot {
        /// Board to snapshot.
        board_id: BoardId,
    },
}

/// Messages sent by the server to a board viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Acknowledges [`ClientMessage::Hello`].
    Welcome {
        /// Echo of the registered session identifier.
        session_id: SessionId,
    },
    /// Acknowledges a board join and delivers the current board state.
    BoardJoined {
        /// Board that was joined.
        board_id: BoardId,
        /// Full current state of the board.
        snapshot: BoardSnapshot,
    },
    /// Direct response to the requester: the move committed.
    MoveAccepted {
        /// Task that moved.
        task_id: TaskId,
        /// Column the task now belongs to.
        column_id: ColumnId,
        /// Persisted position assigned by the server.
        position: i64,
        /// Authoritative ordered id list for every column the move changed
        /// (target column always; source column too on a cross-column move).
        affected: Vec<ColumnOrder>,
        /// Identity of the requester, echoed back.
        moved_by: String,
    },
    /// Direct response to the requester: the move was rejected, nothing
    /// changed durably.
    MoveRejected {
        /// Task from the rejected request.
        task_id: TaskId,
        /// Why the request was rejected.
        reason: MoveRejectReason,
    },
    /// Pushed to every other room member after a move commits.
    TaskMoved {
        /// Task that moved.
        task_id: TaskId,
        /// Column the task was in before the move.
        source_column_id: ColumnId,
        /// Column the task is in after the move.
        target_column_id: ColumnId,
        /// Persisted position assigned by the server.
        position: i64,
        /// Identity of the user who requested the move, so receivers can
        /// distinguish an echoed own change from someone else's change.
        moved_by: String,
        /// Authoritative ordered id list per affected column. Receivers
        /// replace their local ordering wholesale; merging positions field
        /// by field would compound drift from missed intermediate events.
        affected: Vec<ColumnOrder>,
    },
    /// A viewer joined the board's room.
    ViewerJoined {
        /// Board whose room changed.
        board_id: BoardId,
        /// Identity of the viewer who joined.
        user_id: String,
    },
    /// A viewer left the board's room or disconnected.
    ViewerLeft {
        /// Board whose room changed.
        board_id: BoardId,
        /// Identity of the viewer who left.
        user_id: String,
    },
    /// Full board state, response to [`ClientMessage::RequestSnapshot`].
    Snapshot {
        /// Board the snapshot describes.
        board_id: BoardId,
        /// Full current state of the board.
        snapshot: BoardSnapshot,
    },
    /// Protocol-level failure unrelated to a specific move request.
    Error {
        /// Human-readable description.
        reason: String,
    },
}

/// Encodes a [`ClientMessage`] into bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if serialization fails.
pub fn encode_client(msg: &ClientMessage) -> Result<Vec<u8>, CodecError> {
    codec::encode(msg)
}

/// Decodes a [`ClientMessage`] from bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if deserialization fails.
pub fn decode_client(bytes: &[u8]) -> Result<ClientMessage, CodecError> {
    codec::decode(bytes)
}

/// Encodes a [`ServerMessage`] into bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if serialization fails.
pub fn encode_server(msg: &ServerMessage) -> Result<Vec<u8>, CodecError> {
    codec::encode(msg)
}

/// Decodes a [`ServerMessage`] from bytes using postcard.
///
/// # Errors
///
/// Returns [`CodecError::Serialization`] if deserialization fails.
pub fn decode_server(bytes: &[u8]) -> Result<ServerMessage, CodecError> {
    codec::decode(bytes)
}
