//! Pong wire protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Endpoint tag every pong message carries in its envelope
pub const PONG_ENDPOINT: &str = "pong-api";

/// Error codes sent with `error` payloads
pub const ERR_UNKNOWN_TYPE: u16 = 4001;
pub const ERR_IDENTITY_MISMATCH: u16 = 4002;
pub const ERR_JOIN_REJECTED: u16 = 4003;
pub const ERR_TOURNAMENT_REJECTED: u16 = 4004;
pub const ERR_CREATE_REJECTED: u16 = 4005;

/// Outer envelope for every message, both directions:
/// `{ "target_endpoint": "pong-api", "payload": { "type": ..., "pong_data": ... } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub target_endpoint: String,
    pub payload: T,
}

impl Envelope<ServerMsg> {
    pub fn new(payload: ServerMsg) -> Self {
        Self {
            target_endpoint: PONG_ENDPOINT.to_string(),
            payload,
        }
    }
}

/// Game mode selected at match creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Both paddles driven over the creator's single connection
    Local,
    /// One paddle per connected player
    Remote,
}

/// Playfield side; doubles as the scoring side in score events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddleSide {
    Left,
    Right,
}

/// Lifecycle state of a match session (also used at bracket level)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Waiting,
    Countdown,
    Playing,
    /// Reserved: reachable in the state machine, no wire trigger
    Paused,
    Finished,
}

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "pong_data", rename_all = "snake_case")]
pub enum ClientMsg {
    /// Create a new match (local or remote)
    CreateGame(CreateGameData),
    /// Join an open remote match
    JoinGame(JoinGameData),
    /// List open matches waiting for a joiner
    GameList,
    /// Create a new 4-player tournament bracket
    CreateTournament(CreateTournamentData),
    /// Join an open tournament bracket
    JoinTournament(JoinGameData),
    /// List open tournament brackets
    TournamentList,
    /// Paddle movement command
    Input(InputData),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGameData {
    pub player_alias: String,
    pub game_mode: GameMode,
    /// Alias of the second local player (local mode only)
    #[serde(default)]
    pub local_opponent: Option<String>,
    /// Score threshold override; server default applies when absent
    #[serde(default)]
    pub max_score: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinGameData {
    pub game_id: Uuid,
    pub player_alias: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTournamentData {
    pub player_alias: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputData {
    /// Must match the identity the channel is bound to
    pub user_id: String,
    /// true = move up, false = move down
    pub up: bool,
    /// Which paddle to move; honored in local mode only. Remote sessions
    /// derive the side from the bound identity.
    #[serde(default)]
    pub paddle: Option<PaddleSide>,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "pong_data", rename_all = "snake_case")]
pub enum ServerMsg {
    /// Assigned id after creating a match or tournament
    GameCreated(GameCreatedData),
    /// Once-per-second pre-game countdown
    Countdown(CountdownData),
    /// Full authoritative state snapshot, pushed every tick
    GameState(GameStateData),
    /// Match concluded
    GameOver(NoticeData),
    /// Tournament concluded
    TournamentEnd(NoticeData),
    /// Open matches waiting for a joiner
    GameList(GameListData),
    /// Open tournament brackets
    TournamentList(GameListData),
    /// Protocol or validation error
    Error(ErrorData),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameCreatedData {
    pub game_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountdownData {
    pub value: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoticeData {
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameListData {
    pub games: Vec<GameListEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameListEntry {
    pub id: Uuid,
    /// Identity of the creator
    pub owner: String,
    /// Creator's display alias
    pub alias: String,
    pub state: GamePhase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorData {
    pub message: String,
    pub code: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameStateData {
    pub game: GameSnapshot,
}

/// Normalized point in `[0,1] x [0,1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaddleSnapshot {
    pub top_point: Point,
    /// Fraction of playfield height (0-1)
    pub height: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreEntry {
    pub alias: String,
    pub score: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSnapshot {
    pub id: Uuid,
    pub status: GamePhase,
    pub ball: Point,
    pub left_paddle: PaddleSnapshot,
    pub right_paddle: PaddleSnapshot,
    pub max_score: u32,
    pub scores: Vec<ScoreEntry>,
    /// Only meaningful while status is countdown
    pub countdown: u32,
}
