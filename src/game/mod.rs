//! Match simulation, sessions, and the matchmaking registry

pub mod registry;
pub mod session;
pub mod simulation;

pub use registry::{MatchRegistry, MatchmakingService};
pub use session::{MatchSession, PlayerSlot, SessionContext};

use uuid::Uuid;

/// Immutable record of a concluded match, written once to the result store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// "local", "remote" or "tournament"
    pub mode: &'static str,
    pub match_id: Uuid,
    pub left_identity: String,
    pub right_identity: String,
    pub left_alias: String,
    pub right_alias: String,
    pub winner_identity: String,
    pub winner_alias: String,
    pub left_score: u32,
    pub right_score: u32,
}
