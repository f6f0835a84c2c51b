//! Board rooms and broadcast fan-out.
//!
//! A room is the set of sessions currently viewing a board. Each session is
//! in at most one room; joining a board implicitly leaves the previous one.
//! Delivery is best-effort, at-most-once: [`RoomBroadcaster::publish`]
//! pushes typed messages into each member's outbound channel and never
//! blocks on socket I/O, so one slow viewer cannot stall a room. Recovery
//! from missed pushes is the viewer's snapshot resync, not replay.

use std::collections::{HashMap, HashSet};

use boardsync_proto::ids::{BoardId, SessionId};
use boardsync_proto::wire::ServerMessage;
use tokio::sync::RwLock;
use tokio::sync::mpsc::UnboundedSender;

struct Viewer {
    user_id: String,
    sender: UnboundedSender<ServerMessage>,
}

/// Tracks room membership and fans out server pushes.
#[derive(Default)]
pub struct RoomBroadcaster {
    viewers: RwLock<HashMap<SessionId, Viewer>>,
    rooms: RwLock<HashMap<BoardId, HashSet<SessionId>>>,
    /// Session -> board it currently views. The reverse of `rooms`, kept so
    /// join and disconnect need not scan every room.
    current: RwLock<HashMap<SessionId, BoardId>>,
}

impl RoomBroadcaster {
    /// Creates an empty broadcaster.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connected session and its outbound channel. Must be
    /// called before the session can join rooms or receive pushes.
    pub async fn register(
        &self,
        session_id: SessionId,
        user_id: &str,
        sender: UnboundedSender<ServerMessage>,
    ) {
        let mut viewers = self.viewers.write().await;
        viewers.insert(
            session_id,
            Viewer {
                user_id: user_id.to_string(),
                sender,
            },
        );
    }

    /// Returns the user identity a session registered with.
    pub async fn user_of(&self, session_id: SessionId) -> Option<String> {
        let viewers = self.viewers.read().await;
        viewers.get(&session_id).map(|v| v.user_id.clone())
    }

    /// The board a session is currently viewing, if any.
    pub async fn current_board(&self, session_id: SessionId) -> Option<BoardId> {
        let current = self.current.read().await;
        current.get(&session_id).copied()
    }

    /// Number of sessions in a board's room.
    pub async fn room_size(&self, board_id: BoardId) -> usize {
        let rooms = self.rooms.read().await;
        rooms.get(&board_id).map_or(0, HashSet::len)
    }

    /// Moves a session into a board's room, leaving its previous room if it
    /// was in one. Returns the board that was left, so the caller can fan
    /// out the departure there.
    pub async fn join(&self, session_id: SessionId, board_id: BoardId) -> Option<BoardId> {
        let previous = {
            let mut current = self.current.write().await;
            current.insert(session_id, board_id)
        };
        let mut rooms = self.rooms.write().await;
        if let Some(prev) = previous
            && prev != board_id
            && let Some(members) = rooms.get_mut(&prev)
        {
            members.remove(&session_id);
            if members.is_empty() {
                rooms.remove(&prev);
            }
        }
        rooms.entry(board_id).or_default().insert(session_id);
        previous.filter(|prev| *prev != board_id)
    }

    /// Removes a session from a board's room. Idempotent: returns `false`
    /// when the session was not a member.
    pub async fn leave(&self, session_id: SessionId, board_id: BoardId) -> bool {
        {
            let mut current = self.current.write().await;
            if current.get(&session_id) == Some(&board_id) {
                current.remove(&session_id);
            }
        }
        let mut rooms = self.rooms.write().await;
        let Some(members) = rooms.get_mut(&board_id) else {
            return false;
        };
        let was_member = members.remove(&session_id);
        if members.is_empty() {
            rooms.remove(&board_id);
        }
        was_member
    }

    /// Sends a message to every session in a board's room, optionally
    /// excluding one (typically the session whose request caused the push,
    /// which gets a direct response instead).
    ///
    /// Send failures mean the session's writer task already went away; the
    /// membership cleanup belongs to its disconnect path, so they are
    /// ignored here.
    pub async fn publish(
        &self,
        board_id: BoardId,
        message: &ServerMessage,
        exclude: Option<SessionId>,
    ) {
        let members: Vec<SessionId> = {
            let rooms = self.rooms.read().await;
            match rooms.get(&board_id) {
                Some(members) => members
                    .iter()
                    .copied()
                    .filter(|id| Some(*id) != exclude)
                    .collect(),
                None => return,
            }
        };
        let viewers = self.viewers.read().await;
        for session_id in members {
            if let Some(viewer) = viewers.get(&session_id) {
                let _ = viewer.sender.send(message.clone());
            }
        }
    }

    /// Sends a message to one session. Returns `false` if the session is
    /// unknown or its channel is closed.
    pub async fn send(&self, session_id: SessionId, message: ServerMessage) -> bool {
        let viewers = self.viewers.read().await;
        viewers
            .get(&session_id)
            .is_some_and(|v| v.sender.send(message).is_ok())
    }

    /// Removes a session entirely. Returns the room it vacated and its user
    /// identity, so the caller can fan out `ViewerLeft` there.
    pub async fn disconnect(&self, session_id: SessionId) -> Option<(BoardId, String)> {
        let user_id = {
            let mut viewers = self.viewers.write().await;
            viewers.remove(&session_id).map(|v| v.user_id)
        };
        let board_id = {
            let mut current = self.current.write().await;
            current.remove(&session_id)
        };
        if let Some(board_id) = board_id {
            let mut rooms = self.rooms.write().await;
            if let Some(members) = rooms.get_mut(&board_id) {
                members.remove(&session_id);
                if members.is_empty() {
                    rooms.remove(&board_id);
                }
            }
            return user_id.map(|user_id| (board_id, user_id));
        }
        None
    }
}
