//! Spectator socket and wire protocol

pub mod handler;
pub mod protocol;
