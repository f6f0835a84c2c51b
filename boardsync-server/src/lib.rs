//! `BoardSync` coordination server library.
//!
//! Exposes the server for use in tests and embedding. The server accepts
//! WebSocket connections from board viewers, serializes task moves per
//! board, and broadcasts committed orderings to each board's room.

pub mod config;
pub mod coordinator;
pub mod rooms;
pub mod server;
pub mod store;
