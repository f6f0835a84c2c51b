//! `BoardSync` client library.
//!
//! Building blocks for a board-viewing frontend: [`net::BoardClient`] owns
//! the WebSocket session to the coordination server, and [`view::BoardView`]
//! holds the rendered board state with optimistic moves, rollback, and
//! broadcast reconciliation. The frontend wires the two together: requests
//! built by the view go out through the client, and received server
//! messages are fed back into the view.

pub mod net;
pub mod view;
