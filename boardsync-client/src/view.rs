//! Client-side board state and reconciliation.
//!
//! [`BoardView`] holds what the viewer renders: column orderings plus a
//! per-card drag state machine. A drop applies its reorder immediately
//! (optimistic) and records an undo snapshot; the server's direct response
//! then either confirms the move or rolls the affected columns back.
//! Broadcast orderings from other viewers replace local ones wholesale,
//! because merging position by position would compound drift from any
//! missed event.

use std::collections::{HashMap, HashSet};

use boardsync_proto::board::{BoardSnapshot, ColumnOrder, MoveRejectReason};
use boardsync_proto::ids::{BoardId, ColumnId, TaskId};
use boardsync_proto::wire::ClientMessage;

/// Errors from local view operations. These never leave the client; the
/// server has its own validation.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ViewError {
    /// The task is not on the board as currently known.
    #[error("unknown task: {0}")]
    UnknownTask(TaskId),
    /// The column is not on the board as currently known.
    #[error("unknown column: {0}")]
    UnknownColumn(ColumnId),
    /// The task already has a move awaiting the server's verdict. One
    /// in-flight move per task; a second drag would make the rollback
    /// snapshot ambiguous.
    #[error("task {0} already has a move in flight")]
    MoveInFlight(TaskId),
    /// The operation requires an active drag on the task.
    #[error("task {0} is not being dragged")]
    NotDragging(TaskId),
}

/// Where a card is in its move lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardState {
    /// At rest; renders at its stored position.
    Settled,
    /// Picked up locally; follows the pointer.
    Dragging,
    /// Dropped and applied optimistically; awaiting the server's verdict.
    PendingConfirm {
        /// Local sequence number of the in-flight request.
        seq: u64,
    },
    /// Snapping back after a rejection, or after a broadcast relocated the
    /// card out from under an active drag. The UI settles the card via
    /// [`BoardView::finish_rollback`] once the snap-back is done.
    RollingBack,
}

/// An optimistic move awaiting the server's direct response.
#[derive(Debug, Clone)]
struct PendingMove {
    seq: u64,
    /// Column the task was in when the drag started.
    source_column_id: ColumnId,
    /// Column the optimistic apply placed the task in.
    target_column_id: ColumnId,
    /// Requested index in the target column.
    target_index: u32,
    /// Orderings of the columns the optimistic apply touched, without the
    /// optimistic placement. Restored verbatim on rejection; rebased when a
    /// broadcast changes those columns underneath the in-flight move.
    undo: Vec<ColumnOrder>,
}

/// One column as the viewer renders it.
#[derive(Debug, Clone)]
pub struct ColumnView {
    /// Unique column identifier.
    pub id: ColumnId,
    /// Human-readable column name.
    pub name: String,
}

/// Renderable state of one board plus the reconciliation bookkeeping.
pub struct BoardView {
    board_id: BoardId,
    user_id: String,
    columns: Vec<ColumnView>,
    orders: HashMap<ColumnId, Vec<TaskId>>,
    titles: HashMap<TaskId, String>,
    dragging: Option<TaskId>,
    pending: HashMap<TaskId, PendingMove>,
    rolling_back: HashSet<TaskId>,
    next_seq: u64,
}

impl BoardView {
    /// Builds a view from a full board snapshot.
    #[must_use]
    pub fn load(user_id: &str, snapshot: &BoardSnapshot) -> Self {
        let mut view = Self {
            board_id: snapshot.board_id,
            user_id: user_id.to_string(),
            columns: Vec::new(),
            orders: HashMap::new(),
            titles: HashMap::new(),
            dragging: None,
            pending: HashMap::new(),
            rolling_back: HashSet::new(),
            next_seq: 0,
        };
        view.replace_from_snapshot(snapshot);
        view
    }

    /// Returns the board this view renders.
    #[must_use]
    pub const fn board_id(&self) -> BoardId {
        self.board_id
    }

    /// Columns in display rank order.
    #[must_use]
    pub fn columns(&self) -> &[ColumnView] {
        &self.columns
    }

    /// The rendered task order of one column.
    #[must_use]
    pub fn column_order(&self, column_id: ColumnId) -> Option<&[TaskId]> {
        self.orders.get(&column_id).map(Vec::as_slice)
    }

    /// The title of a task, if it is on the board.
    #[must_use]
    pub fn title(&self, task_id: TaskId) -> Option<&str> {
        self.titles.get(&task_id).map(String::as_str)
    }

    /// Where a card is in its move lifecycle.
    #[must_use]
    pub fn state_of(&self, task_id: TaskId) -> CardState {
        if self.dragging == Some(task_id) {
            return CardState::Dragging;
        }
        if self.rolling_back.contains(&task_id) {
            return CardState::RollingBack;
        }
        self.pending
            .get(&task_id)
            .map_or(CardState::Settled, |p| CardState::PendingConfirm {
                seq: p.seq,
            })
    }

    /// Whether any move is still awaiting the server's verdict.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Picks a card up.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::UnknownTask`] or [`ViewError::MoveInFlight`].
    pub fn begin_drag(&mut self, task_id: TaskId) -> Result<(), ViewError> {
        if !self.titles.contains_key(&task_id) {
            return Err(ViewError::UnknownTask(task_id));
        }
        if self.pending.contains_key(&task_id) {
            return Err(ViewError::MoveInFlight(task_id));
        }
        // Grabbing a snapping-back card ends its snap-back.
        self.rolling_back.remove(&task_id);
        self.dragging = Some(task_id);
        Ok(())
    }

    /// Abandons a drag. The card snaps back; nothing is sent.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::NotDragging`] if the task is not being dragged.
    pub fn cancel_drag(&mut self, task_id: TaskId) -> Result<(), ViewError> {
        if self.dragging != Some(task_id) {
            return Err(ViewError::NotDragging(task_id));
        }
        self.dragging = None;
        Ok(())
    }

    /// Drops a dragged card at `target_index` in `target_column_id`.
    ///
    /// Applies the reorder locally right away, records the undo snapshot,
    /// and returns the request to send. The card stays in
    /// [`CardState::PendingConfirm`] until [`Self::apply_move_accepted`] or
    /// [`Self::apply_move_rejected`] resolves it.
    ///
    /// # Errors
    ///
    /// Returns [`ViewError::NotDragging`] or [`ViewError::UnknownColumn`].
    pub fn drop_card(
        &mut self,
        task_id: TaskId,
        target_column_id: ColumnId,
        target_index: u32,
    ) -> Result<ClientMessage, ViewError> {
        if self.dragging != Some(task_id) {
            return Err(ViewError::NotDragging(task_id));
        }
        if !self.orders.contains_key(&target_column_id) {
            return Err(ViewError::UnknownColumn(target_column_id));
        }
        self.dragging = None;

        let source_column_id = self.column_of(task_id).ok_or(ViewError::UnknownTask(task_id))?;
        let mut undo = vec![self.order_snapshot(target_column_id)];
        if source_column_id != target_column_id {
            undo.push(self.order_snapshot(source_column_id));
        }

        // Optimistic apply: remove from the source order, insert clamped
        // into the target order.
        if let Some(source) = self.orders.get_mut(&source_column_id) {
            source.retain(|id| *id != task_id);
        }
        if let Some(target) = self.orders.get_mut(&target_column_id) {
            let index = usize::try_from(target_index)
                .unwrap_or(usize::MAX)
                .min(target.len());
            target.insert(index, task_id);
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(
            task_id,
            PendingMove {
                seq,
                source_column_id,
                target_column_id,
                target_index,
                undo,
            },
        );

        tracing::debug!(task_id = %task_id, target = %target_column_id, seq, "optimistic move applied");
        Ok(ClientMessage::MoveTask {
            task_id,
            target_column_id,
            target_index,
        })
    }

    /// Confirms an in-flight move with the server's authoritative orderings.
    ///
    /// Returns `false` when no move was pending for the task; a confirmation
    /// that arrives after a resync already discarded the pending entry is
    /// stale and ignored.
    pub fn apply_move_accepted(&mut self, task_id: TaskId, affected: &[ColumnOrder]) -> bool {
        if self.pending.remove(&task_id).is_none() {
            tracing::debug!(task_id = %task_id, "ignoring stale move confirmation");
            return false;
        }
        self.replace_orders(affected);
        true
    }

    /// Rolls an in-flight move back to its undo snapshot. The card is left
    /// in [`CardState::RollingBack`] so the UI can animate the snap-back
    /// before calling [`Self::finish_rollback`].
    ///
    /// Returns `false` when no move was pending for the task.
    pub fn apply_move_rejected(&mut self, task_id: TaskId, reason: MoveRejectReason) -> bool {
        let Some(pending) = self.pending.remove(&task_id) else {
            tracing::debug!(task_id = %task_id, "ignoring stale move rejection");
            return false;
        };
        tracing::debug!(task_id = %task_id, %reason, "rolling back rejected move");
        self.replace_orders(&pending.undo);
        self.rolling_back.insert(task_id);
        true
    }

    /// Settles a card once its snap-back is done. Returns `false` when the
    /// card was not rolling back.
    pub fn finish_rollback(&mut self, task_id: TaskId) -> bool {
        self.rolling_back.remove(&task_id)
    }

    /// Applies a `TaskMoved` broadcast from another viewer.
    ///
    /// Orderings are replaced wholesale. An echo of our own change
    /// (`moved_by` matches this viewer's identity) is ignored: the direct
    /// response already settled it, and re-applying could clobber a newer
    /// local state. Still-pending moves are rebased onto the new orderings:
    /// their undo snapshots track the latest remote state (without the
    /// optimistic placement) and the rendered orders keep the card exactly
    /// once, in the column the viewer dropped it in. If the event relocated
    /// a card the viewer is mid-drag on, the drag is invalidated and the
    /// card snaps back.
    pub fn apply_task_moved(&mut self, moved_by: &str, affected: &[ColumnOrder]) {
        if moved_by == self.user_id {
            tracing::trace!("suppressing echo of own move");
            return;
        }
        let drag_source = self.dragging.map(|task_id| (task_id, self.column_of(task_id)));
        self.replace_orders(affected);
        if let Some((task_id, source)) = drag_source
            && self.column_of(task_id) != source
        {
            tracing::debug!(task_id = %task_id, "broadcast invalidated active drag");
            self.dragging = None;
            self.rolling_back.insert(task_id);
        }
        let pending_ids: Vec<TaskId> = self.pending.keys().copied().collect();
        for task_id in pending_ids {
            self.rebase_pending(task_id, affected);
        }
    }

    /// Reconciles one in-flight move with freshly applied remote orderings.
    ///
    /// Remote orders do not know about the optimistic placement: for a
    /// cross-column move the source order still carries the pending task at
    /// its committed position. The undo snapshot adopts each remote order
    /// with the placement factored out (stripped from the target, kept in
    /// the source, reinserted at its pre-drop index when the remote order
    /// lost it), so a later rollback restores the latest remote state with
    /// the task exactly once, back home. The rendered orders then re-assert
    /// the placement, so the card never shows in two columns at once.
    fn rebase_pending(&mut self, task_id: TaskId, affected: &[ColumnOrder]) {
        let Some(pending) = self.pending.get_mut(&task_id) else {
            return;
        };
        let source_column_id = pending.source_column_id;
        let target_column_id = pending.target_column_id;
        let target_index = pending.target_index;
        for entry in &mut pending.undo {
            let Some(remote) = affected.iter().find(|o| o.column_id == entry.column_id) else {
                continue;
            };
            let mut ordered = remote.ordered.clone();
            if entry.column_id == target_column_id && target_column_id != source_column_id {
                ordered.retain(|id| *id != task_id);
            } else if !ordered.contains(&task_id) {
                let home = entry
                    .ordered
                    .iter()
                    .position(|id| *id == task_id)
                    .unwrap_or(ordered.len())
                    .min(ordered.len());
                ordered.insert(home, task_id);
            }
            entry.ordered = ordered;
        }
        for (column_id, order) in &mut self.orders {
            if *column_id != target_column_id {
                order.retain(|id| *id != task_id);
            }
        }
        if let Some(order) = self.orders.get_mut(&target_column_id)
            && !order.contains(&task_id)
        {
            let index = usize::try_from(target_index)
                .unwrap_or(usize::MAX)
                .min(order.len());
            order.insert(index, task_id);
        }
    }

    /// Replaces the whole view from a fresh snapshot, discarding any drag
    /// or pending state. This is the resync path after a connection gap:
    /// current state supersedes everything optimistic.
    pub fn apply_snapshot(&mut self, snapshot: &BoardSnapshot) {
        self.dragging = None;
        self.pending.clear();
        self.rolling_back.clear();
        self.replace_from_snapshot(snapshot);
        tracing::debug!(board_id = %snapshot.board_id, "view resynced from snapshot");
    }

    /// The column currently holding a task in the rendered orders.
    #[must_use]
    pub fn column_of(&self, task_id: TaskId) -> Option<ColumnId> {
        self.orders
            .iter()
            .find(|(_, order)| order.contains(&task_id))
            .map(|(column_id, _)| *column_id)
    }

    fn order_snapshot(&self, column_id: ColumnId) -> ColumnOrder {
        ColumnOrder {
            column_id,
            ordered: self.orders.get(&column_id).cloned().unwrap_or_default(),
        }
    }

    fn replace_orders(&mut self, orders: &[ColumnOrder]) {
        for order in orders {
            if self.orders.contains_key(&order.column_id) {
                self.orders
                    .insert(order.column_id, order.ordered.clone());
            }
        }
    }

    fn replace_from_snapshot(&mut self, snapshot: &BoardSnapshot) {
        self.board_id = snapshot.board_id;
        self.columns = snapshot
            .columns
            .iter()
            .map(|c| ColumnView {
                id: c.column_id,
                name: c.name.clone(),
            })
            .collect();
        self.orders = snapshot
            .columns
            .iter()
            .map(|c| (c.column_id, c.tasks.iter().map(|t| t.id).collect()))
            .collect();
        self.titles = snapshot
            .columns
            .iter()
            .flat_map(|c| c.tasks.iter())
            .map(|t| (t.id, t.title.clone()))
            .collect();
    }
}
