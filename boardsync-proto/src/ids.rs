//! Identifier newtypes for boards, columns, tasks, and viewer sessions.
//!
//! All ids are UUID v7 so they sort by creation time. User identity is
//! deliberately not a newtype: it arrives as an opaque, already-validated
//! string from the authentication layer and is only carried through for
//! echo suppression and audit.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new time-ordered identifier (UUID v7).
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Creates an identifier from an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the inner UUID value.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id! {
    /// Unique identifier for a board (one kanban view of a project).
    BoardId
}

uuid_id! {
    /// Unique identifier for a column (an ordered bucket of tasks).
    ColumnId
}

uuid_id! {
    /// Unique identifier for a task.
    TaskId
}

uuid_id! {
    /// Unique identifier for one live viewer connection.
    ///
    /// A session is created per WebSocket connection and belongs to at most
    /// one board room at a time.
    SessionId
}
