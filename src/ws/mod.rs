//! WebSocket transport: protocol types, connection directory, upgrade handler

pub mod directory;
pub mod handler;
pub mod protocol;
