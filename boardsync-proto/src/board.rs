//! Board state wire types.
//!
//! These are the DTOs carried inside [`crate::wire`] messages: per-task
//! summaries, per-column ordered id lists, and full board snapshots used
//! for join and resync. The server's durable records are richer; only the
//! fields viewers need to render and reconcile orderings cross the wire.

use serde::{Deserialize, Serialize};

use crate::ids::{BoardId, ColumnId, TaskId};

/// A task as seen by board viewers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    /// Unique task identifier.
    pub id: TaskId,
    /// Column the task currently belongs to.
    pub column_id: ColumnId,
    /// Sort key within the column. Unique among active tasks of the column;
    /// not required to be contiguous (soft deletes leave gaps).
    pub position: i64,
    /// Task title.
    pub title: String,
}

/// The full ordered task id list of one column.
///
/// This is the unit of ordering change: move results and `TaskMoved`
/// broadcasts carry one `ColumnOrder` per affected column, and receivers
/// replace their local ordering wholesale rather than merging positions
/// field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnOrder {
    /// Which column this ordering belongs to.
    pub column_id: ColumnId,
    /// Active task ids in visual order (position ascending).
    pub ordered: Vec<TaskId>,
}

/// One column with its tasks, as carried in a [`BoardSnapshot`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSnapshot {
    /// Unique column identifier.
    pub column_id: ColumnId,
    /// Human-readable column name.
    pub name: String,
    /// Display rank among the board's columns. A separate ordering dimension,
    /// orthogonal to task positions.
    pub rank: u32,
    /// Whether newly created tasks land here when no column is specified.
    pub is_default: bool,
    /// Active tasks sorted by position.
    pub tasks: Vec<TaskSummary>,
}

/// Full current state of one board, sorted by column rank.
///
/// Sent on board join and on explicit resync. Snapshots are the recovery
/// path for missed broadcasts: ordering is current state, not an append
/// log, so re-fetching is strictly sufficient after a connection gap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSnapshot {
    /// Which board this snapshot describes.
    pub board_id: BoardId,
    /// Columns in display rank order.
    pub columns: Vec<ColumnSnapshot>,
}

impl BoardSnapshot {
    /// Returns the ordered task id list of one column, if the column exists.
    #[must_use]
    pub fn column_order(&self, column_id: ColumnId) -> Option<ColumnOrder> {
        self.columns
            .iter()
            .find(|c| c.column_id == column_id)
            .map(|c| ColumnOrder {
                column_id,
                ordered: c.tasks.iter().map(|t| t.id).collect(),
            })
    }
}

/// Why a move request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveRejectReason {
    /// The task no longer exists or was deleted. Surfaced to the user,
    /// never retried.
    TaskNotFound,
    /// The target column does not exist.
    ColumnNotFound,
    /// The target column belongs to a different board than the task.
    ForeignColumn,
    /// The commit lost out to storage contention. Safe to retry the original
    /// request a bounded number of times: the operation is defined over
    /// indices, so a retry rebases cleanly on whatever committed first.
    StoreBusy,
}

impl MoveRejectReason {
    /// Whether the caller may automatically retry the original request.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::StoreBusy)
    }
}

impl std::fmt::Display for MoveRejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskNotFound => write!(f, "task not found"),
            Self::ColumnNotFound => write!(f, "column not found"),
            Self::ForeignColumn => write!(f, "column belongs to a different board"),
            Self::StoreBusy => write!(f, "store busy, retry"),
        }
    }
}
