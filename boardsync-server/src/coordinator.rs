//! Board coordinator: validates and commits move requests.
//!
//! All position changes flow through [`BoardCoordinator::move_task`]; it is
//! the single writer path for orderings. Validation happens against current
//! store state, never against the state the requester saw, so concurrent
//! moves of distinct tasks on one board both succeed with the later commit
//! rebasing on the earlier one's renumbering.

use std::sync::Arc;
use std::time::Duration;

use boardsync_proto::board::{ColumnOrder, MoveRejectReason};
use boardsync_proto::ids::{ColumnId, TaskId};

use crate::store::{BoardStore, BoardTable};

/// How many times a move attempts to take the board lock before giving up
/// with [`MoveError::StoreBusy`].
pub const DEFAULT_MOVE_RETRY_LIMIT: u32 = 3;

/// Pause between lock attempts. Commits are short in-memory renumberings,
/// so a few milliseconds is enough for the holder to finish.
const RETRY_BACKOFF: Duration = Duration::from_millis(5);

/// Why a move request did not commit. Nothing changed durably in any
/// rejection case.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum MoveError {
    /// The task does not exist or was deleted.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// The target column does not exist on any board.
    #[error("column not found: {0}")]
    ColumnNotFound(ColumnId),
    /// The target column belongs to a different board than the task.
    #[error("column {0} belongs to a different board")]
    ForeignColumn(ColumnId),
    /// Could not take the board lock within the retry budget.
    #[error("store busy")]
    StoreBusy,
}

impl MoveError {
    /// The wire-level rejection reason for this error.
    #[must_use]
    pub const fn reject_reason(&self) -> MoveRejectReason {
        match self {
            Self::TaskNotFound(_) => MoveRejectReason::TaskNotFound,
            Self::ColumnNotFound(_) => MoveRejectReason::ColumnNotFound,
            Self::ForeignColumn(_) => MoveRejectReason::ForeignColumn,
            Self::StoreBusy => MoveRejectReason::StoreBusy,
        }
    }
}

/// Result of a committed move, carrying everything the server needs to
/// answer the requester and to broadcast to the rest of the room.
#[derive(Debug, Clone)]
pub struct MoveOutcome {
    /// Task that moved.
    pub task_id: TaskId,
    /// Column the task was in before the move.
    pub source_column_id: ColumnId,
    /// Column the task is in after the move.
    pub column_id: ColumnId,
    /// Persisted position assigned to the task.
    pub position: i64,
    /// Authoritative ordered id list per column the move changed: the
    /// target column always, the source column too on a cross-column move.
    pub affected: Vec<ColumnOrder>,
    /// Identity of the user who requested the move.
    pub moved_by: String,
}

/// Serializes and commits move requests against the store.
pub struct BoardCoordinator {
    store: Arc<BoardStore>,
    retry_limit: u32,
}

impl BoardCoordinator {
    /// Creates a coordinator over the given store with the default retry
    /// budget.
    #[must_use]
    pub fn new(store: Arc<BoardStore>) -> Self {
        Self::with_retry_limit(store, DEFAULT_MOVE_RETRY_LIMIT)
    }

    /// Creates a coordinator with an explicit lock retry budget.
    #[must_use]
    pub const fn with_retry_limit(store: Arc<BoardStore>, retry_limit: u32) -> Self {
        Self { store, retry_limit }
    }

    /// Returns the store this coordinator commits against.
    #[must_use]
    pub fn store(&self) -> &Arc<BoardStore> {
        &self.store
    }

    /// Moves a task so it occupies `target_index` in the target column's
    /// post-move ordering.
    ///
    /// The request is validated against current store state: the task must
    /// exist and be active, and the target column must belong to the task's
    /// board. The commit runs under the task's board lock; if the lock
    /// cannot be taken within the retry budget the request fails with
    /// [`MoveError::StoreBusy`], which the requester may retry as-is since
    /// index-based requests rebase cleanly on whatever committed meanwhile.
    ///
    /// # Errors
    ///
    /// Returns [`MoveError::TaskNotFound`], [`MoveError::ColumnNotFound`],
    /// [`MoveError::ForeignColumn`], or [`MoveError::StoreBusy`].
    pub async fn move_task(
        &self,
        task_id: TaskId,
        target_column_id: ColumnId,
        target_index: u32,
        requester: &str,
    ) -> Result<MoveOutcome, MoveError> {
        let board_id = self
            .store
            .board_of_task(task_id)
            .await
            .ok_or(MoveError::TaskNotFound(task_id))?;
        let column_board = self
            .store
            .board_of_column(target_column_id)
            .await
            .ok_or(MoveError::ColumnNotFound(target_column_id))?;
        if column_board != board_id {
            return Err(MoveError::ForeignColumn(target_column_id));
        }
        let table = self
            .store
            .board(board_id)
            .await
            .ok_or(MoveError::TaskNotFound(task_id))?;

        for attempt in 0..self.retry_limit {
            if let Ok(mut guard) = table.try_lock() {
                let outcome =
                    Self::commit(&mut guard, task_id, target_column_id, target_index, requester)?;
                tracing::debug!(
                    task_id = %task_id,
                    from = %outcome.source_column_id,
                    to = %outcome.column_id,
                    position = outcome.position,
                    moved_by = requester,
                    "move committed"
                );
                return Ok(outcome);
            }
            tracing::trace!(task_id = %task_id, attempt, "board busy, backing off");
            tokio::time::sleep(RETRY_BACKOFF).await;
        }
        tracing::warn!(task_id = %task_id, board_id = %board_id, "move gave up on contended board");
        Err(MoveError::StoreBusy)
    }

    /// The commit itself, run while holding the board lock. Re-validates the
    /// task, since it may have been deleted between lookup and lock.
    fn commit(
        table: &mut BoardTable,
        task_id: TaskId,
        target_column_id: ColumnId,
        target_index: u32,
        requester: &str,
    ) -> Result<MoveOutcome, MoveError> {
        let source_column_id = match table.task(task_id) {
            Some(task) if task.active => task.column_id,
            _ => return Err(MoveError::TaskNotFound(task_id)),
        };

        let index = usize::try_from(target_index).unwrap_or(usize::MAX);
        let position = table.shift_and_insert(target_column_id, task_id, index);
        let mut affected = vec![table.column_order(target_column_id)];
        if source_column_id != target_column_id {
            table.compact_column(source_column_id);
            affected.push(table.column_order(source_column_id));
        }

        Ok(MoveOutcome {
            task_id,
            source_column_id,
            column_id: target_column_id,
            position,
            affected,
            moved_by: requester.to_string(),
        })
    }
}
