//! Shared protocol definitions for the `BoardSync` wire format.

pub mod board;
pub mod codec;
pub mod ids;
pub mod wire;
