//! Pong Match Server - authoritative multiplayer Pong
//!
//! The server owns all game state: clients send paddle intents and receive
//! full state snapshots at a fixed tick rate. It handles:
//! - WebSocket connections for match and tournament play
//! - Lobby listing and joining of open matches and brackets
//! - Four-player single-elimination tournaments
//! - Match history persistence to an external store

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod store;
pub mod tournament;
pub mod util;
pub mod ws;
