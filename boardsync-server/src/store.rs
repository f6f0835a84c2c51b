//! Durable position store for board tasks and columns.
//!
//! Holds the authoritative `(column, position)` pair for every task. Each
//! board's table sits behind its own [`Mutex`], which is the explicit
//! per-board exclusivity for move commits: the read-then-renumber sequence
//! in [`BoardTable::shift_and_insert`] is not safe to interleave, so one
//! move against a board runs to completion before a conflicting one starts,
//! while unrelated boards proceed fully in parallel.
//!
//! Invariant: after any store operation, the active tasks of every column
//! hold strictly totally ordered, unique positions.

use std::collections::HashMap;
use std::sync::Arc;

use boardsync_proto::board::{BoardSnapshot, ColumnOrder, ColumnSnapshot, TaskSummary};
use boardsync_proto::ids::{BoardId, ColumnId, TaskId};
use tokio::sync::{Mutex, RwLock};

/// Errors that can occur during store operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// The board does not exist.
    #[error("board not found: {0}")]
    BoardNotFound(BoardId),
    /// The column does not exist on the board.
    #[error("column not found: {0}")]
    ColumnNotFound(ColumnId),
    /// The task does not exist or was deleted.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),
    /// The board has no default column to receive a new task.
    #[error("board {0} has no default column")]
    NoDefaultColumn(BoardId),
}

/// Column definition used when creating a board.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    /// Human-readable column name.
    pub name: String,
    /// Whether new tasks land here when no column is specified.
    pub is_default: bool,
}

impl ColumnSpec {
    /// Creates a non-default column spec.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_default: false,
        }
    }

    /// Creates a default-destination column spec.
    #[must_use]
    pub fn default_destination(name: &str) -> Self {
        Self {
            name: name.to_string(),
            is_default: true,
        }
    }
}

/// Durable record of one column.
#[derive(Debug, Clone)]
pub struct ColumnRecord {
    /// Unique column identifier.
    pub id: ColumnId,
    /// Human-readable column name.
    pub name: String,
    /// Display rank among the board's columns.
    pub rank: u32,
    /// Whether new tasks land here when no column is specified.
    pub is_default: bool,
}

/// Durable record of one task.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    /// Unique task identifier.
    pub id: TaskId,
    /// Column the task currently belongs to.
    pub column_id: ColumnId,
    /// Sort key within the column, unique among the column's active tasks.
    pub position: i64,
    /// Task title.
    pub title: String,
    /// `false` once the task is soft-deleted. Deleted tasks keep their
    /// position; siblings are not renumbered, so deletions leave gaps.
    pub active: bool,
    /// Identity of the user who created the task.
    pub created_by: String,
}

/// One board's columns and tasks. Always accessed through the per-board
/// mutex handed out by [`BoardStore::board`].
#[derive(Debug)]
pub struct BoardTable {
    board_id: BoardId,
    columns: Vec<ColumnRecord>,
    tasks: HashMap<TaskId, TaskRecord>,
}

impl BoardTable {
    fn new(board_id: BoardId, columns: Vec<ColumnRecord>) -> Self {
        Self {
            board_id,
            columns,
            tasks: HashMap::new(),
        }
    }

    /// Returns the board this table belongs to.
    #[must_use]
    pub const fn board_id(&self) -> BoardId {
        self.board_id
    }

    /// Returns the column record, if the column exists on this board.
    #[must_use]
    pub fn column(&self, column_id: ColumnId) -> Option<&ColumnRecord> {
        self.columns.iter().find(|c| c.id == column_id)
    }

    /// Returns the task record, including soft-deleted tasks.
    #[must_use]
    pub fn task(&self, task_id: TaskId) -> Option<&TaskRecord> {
        self.tasks.get(&task_id)
    }

    /// Active task ids of a column in position order, optionally excluding
    /// one task (the one being moved).
    #[must_use]
    pub fn active_order(&self, column_id: ColumnId, exclude: Option<TaskId>) -> Vec<TaskId> {
        let mut tasks: Vec<&TaskRecord> = self
            .tasks
            .values()
            .filter(|t| t.active && t.column_id == column_id && Some(t.id) != exclude)
            .collect();
        tasks.sort_by_key(|t| t.position);
        tasks.into_iter().map(|t| t.id).collect()
    }

    /// The full ordered task id list of a column, as carried on the wire.
    #[must_use]
    pub fn column_order(&self, column_id: ColumnId) -> ColumnOrder {
        ColumnOrder {
            column_id,
            ordered: self.active_order(column_id, None),
        }
    }

    /// Repositions `moving` so it sorts at exactly `target_index` among the
    /// target column's other active tasks, returning the assigned position.
    ///
    /// `target_index` counts insertion points in the post-move ordering and
    /// is clamped to the column length. Renumbering policy: the post-move
    /// ordered id list is computed first, then positions `0..n` are written
    /// for rows whose stored value differs. The assignment set is complete
    /// before the first write, so the operation is all-or-nothing under the
    /// board mutex. A same-column reorder only rewrites tasks between the
    /// old and new index; the compaction of a vacated source column is the
    /// caller's job (see [`Self::compact_column`]).
    pub fn shift_and_insert(
        &mut self,
        column_id: ColumnId,
        moving: TaskId,
        target_index: usize,
    ) -> i64 {
        let mut order = self.active_order(column_id, Some(moving));
        let index = target_index.min(order.len());
        order.insert(index, moving);

        let assignments = Self::renumber(&order);
        let assigned = assignments
            .iter()
            .find(|(id, _)| *id == moving)
            .map_or(0, |(_, pos)| *pos);
        for (id, position) in assignments {
            if let Some(task) = self.tasks.get_mut(&id) {
                if task.position != position || task.column_id != column_id {
                    task.position = position;
                    task.column_id = column_id;
                }
            }
        }
        assigned
    }

    /// Renumbers a column's active tasks `0..n`, closing the hole left when
    /// a task moved out. Gaps from deletions are tolerated elsewhere, but an
    /// uncompacted move would eventually misalign requested indices with
    /// stored positions, so the vacated column is compacted on every
    /// cross-column move.
    pub fn compact_column(&mut self, column_id: ColumnId) {
        let order = self.active_order(column_id, None);
        for (id, position) in Self::renumber(&order) {
            if let Some(task) = self.tasks.get_mut(&id) {
                if task.position != position {
                    task.position = position;
                }
            }
        }
    }

    fn renumber(order: &[TaskId]) -> Vec<(TaskId, i64)> {
        order
            .iter()
            .enumerate()
            .map(|(i, id)| (*id, i64::try_from(i).unwrap_or(i64::MAX)))
            .collect()
    }

    /// Builds the wire snapshot of this board: columns in rank order, active
    /// tasks per column in position order.
    #[must_use]
    pub fn snapshot(&self) -> BoardSnapshot {
        let mut columns = self.columns.clone();
        columns.sort_by_key(|c| c.rank);
        let columns = columns
            .into_iter()
            .map(|c| ColumnSnapshot {
                tasks: self
                    .active_order(c.id, None)
                    .into_iter()
                    .filter_map(|id| self.tasks.get(&id))
                    .map(|t| TaskSummary {
                        id: t.id,
                        column_id: t.column_id,
                        position: t.position,
                        title: t.title.clone(),
                    })
                    .collect(),
                column_id: c.id,
                name: c.name,
                rank: c.rank,
                is_default: c.is_default,
            })
            .collect();
        BoardSnapshot {
            board_id: self.board_id,
            columns,
        }
    }

    fn insert_task(&mut self, task: TaskRecord) {
        self.tasks.insert(task.id, task);
    }

    fn next_position(&self, column_id: ColumnId) -> i64 {
        self.tasks
            .values()
            .filter(|t| t.active && t.column_id == column_id)
            .map(|t| t.position)
            .max()
            .map_or(0, |max| max + 1)
    }
}

/// The store: one [`BoardTable`] per board, each behind its own mutex.
///
/// The outer map is only touched on board creation and lookup; all task
/// mutations go through the per-board mutex, so boards never contend with
/// one another.
pub struct BoardStore {
    boards: RwLock<HashMap<BoardId, Arc<Mutex<BoardTable>>>>,
    /// Task -> board index so move requests, which carry no board id, can
    /// locate the owning table.
    task_index: RwLock<HashMap<TaskId, BoardId>>,
    /// Column -> board index, used to tell a foreign column apart from a
    /// nonexistent one when rejecting a move.
    column_index: RwLock<HashMap<ColumnId, BoardId>>,
}

impl Default for BoardStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardStore {
    /// Creates a new, empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            boards: RwLock::new(HashMap::new()),
            task_index: RwLock::new(HashMap::new()),
            column_index: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a board with the given columns, ranked in the order given.
    ///
    /// Returns the new board id and the column ids in the same order as
    /// `columns`.
    pub async fn create_board(&self, columns: &[ColumnSpec]) -> (BoardId, Vec<ColumnId>) {
        let board_id = BoardId::new();
        let records: Vec<ColumnRecord> = columns
            .iter()
            .enumerate()
            .map(|(rank, spec)| ColumnRecord {
                id: ColumnId::new(),
                name: spec.name.clone(),
                rank: u32::try_from(rank).unwrap_or(u32::MAX),
                is_default: spec.is_default,
            })
            .collect();
        let column_ids: Vec<ColumnId> = records.iter().map(|c| c.id).collect();

        {
            let mut index = self.column_index.write().await;
            for id in &column_ids {
                index.insert(*id, board_id);
            }
        }
        let table = BoardTable::new(board_id, records);
        self.boards
            .write()
            .await
            .insert(board_id, Arc::new(Mutex::new(table)));

        tracing::info!(board_id = %board_id, columns = column_ids.len(), "board created");
        (board_id, column_ids)
    }

    /// Returns the handle to a board's table, if the board exists.
    pub async fn board(&self, board_id: BoardId) -> Option<Arc<Mutex<BoardTable>>> {
        let boards = self.boards.read().await;
        boards.get(&board_id).cloned()
    }

    /// Returns the board a task belongs to, including soft-deleted tasks.
    pub async fn board_of_task(&self, task_id: TaskId) -> Option<BoardId> {
        let index = self.task_index.read().await;
        index.get(&task_id).copied()
    }

    /// Returns the board a column belongs to.
    pub async fn board_of_column(&self, column_id: ColumnId) -> Option<BoardId> {
        let index = self.column_index.read().await;
        index.get(&column_id).copied()
    }

    /// Creates a task appended to the end of the target column (the board's
    /// default column when `column_id` is `None`): position = current max + 1.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BoardNotFound`], [`StoreError::ColumnNotFound`],
    /// or [`StoreError::NoDefaultColumn`].
    pub async fn create_task(
        &self,
        board_id: BoardId,
        column_id: Option<ColumnId>,
        title: &str,
        created_by: &str,
    ) -> Result<TaskSummary, StoreError> {
        let table = self
            .board(board_id)
            .await
            .ok_or(StoreError::BoardNotFound(board_id))?;
        let mut table = table.lock().await;

        let column_id = match column_id {
            Some(id) => {
                table.column(id).ok_or(StoreError::ColumnNotFound(id))?;
                id
            }
            None => table
                .columns
                .iter()
                .find(|c| c.is_default)
                .map(|c| c.id)
                .ok_or(StoreError::NoDefaultColumn(board_id))?,
        };

        let task = TaskRecord {
            id: TaskId::new(),
            column_id,
            position: table.next_position(column_id),
            title: title.to_string(),
            active: true,
            created_by: created_by.to_string(),
        };
        let summary = TaskSummary {
            id: task.id,
            column_id: task.column_id,
            position: task.position,
            title: task.title.clone(),
        };
        table.insert_task(task);
        drop(table);

        self.task_index.write().await.insert(summary.id, board_id);
        Ok(summary)
    }

    /// Soft-deletes a task. Siblings keep their positions; the gap is not
    /// reclaimed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if the task does not exist or
    /// is already deleted.
    pub async fn delete_task(&self, task_id: TaskId) -> Result<(), StoreError> {
        let board_id = self
            .board_of_task(task_id)
            .await
            .ok_or(StoreError::TaskNotFound(task_id))?;
        let table = self
            .board(board_id)
            .await
            .ok_or(StoreError::TaskNotFound(task_id))?;
        let mut table = table.lock().await;
        match table.tasks.get_mut(&task_id) {
            Some(task) if task.active => {
                task.active = false;
                Ok(())
            }
            _ => Err(StoreError::TaskNotFound(task_id)),
        }
    }

    /// Builds the full current snapshot of a board.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::BoardNotFound`] if the board does not exist.
    pub async fn snapshot(&self, board_id: BoardId) -> Result<BoardSnapshot, StoreError> {
        let table = self
            .board(board_id)
            .await
            .ok_or(StoreError::BoardNotFound(board_id))?;
        let table = table.lock().await;
        Ok(table.snapshot())
    }
}
