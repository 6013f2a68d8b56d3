//! Match registry and matchmaking operations
//!
//! The registry is a mutex-guarded map keyed by participant identity; both
//! players of a match point at the same session. All validation failures are
//! local no-ops with an optional error notification back to the requester —
//! the registry never enters an invalid shared state because of a bad
//! request.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::store::ResultStore;
use crate::tournament::TournamentEvent;
use crate::ws::directory::{ChannelId, ConnectionDirectory};
use crate::ws::protocol::{
    CreateGameData, ErrorData, GameCreatedData, GameListData, GameListEntry, GameMode, GamePhase,
    InputData, JoinGameData, ServerMsg, ERR_CREATE_REJECTED, ERR_IDENTITY_MISMATCH,
    ERR_JOIN_REJECTED,
};

use super::session::{MatchSession, PlayerSlot, SessionContext};

/// Registry of active matches, keyed by participant identity.
/// Both participants' entries hold the same `Arc`.
pub struct MatchRegistry {
    sessions: Mutex<HashMap<String, Arc<MatchSession>>>,
}

impl MatchRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, identity: &str) -> Option<Arc<MatchSession>> {
        self.sessions.lock().get(identity).cloned()
    }

    pub fn get_by_id(&self, id: Uuid) -> Option<Arc<MatchSession>> {
        self.sessions
            .lock()
            .values()
            .find(|s| s.id == id)
            .cloned()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.sessions.lock().contains_key(identity)
    }

    /// Register the session under every participant identity. Refuses to
    /// overwrite: when any participant already holds a session the map is
    /// left untouched and the new session must not be started. A participant
    /// is in at most one match at a time.
    pub fn insert(&self, session: &Arc<MatchSession>) -> bool {
        let mut sessions = self.sessions.lock();
        let slots = session.participants();
        if slots
            .iter()
            .any(|slot| sessions.contains_key(&slot.identity))
        {
            return false;
        }
        for slot in slots {
            sessions.insert(slot.identity, session.clone());
        }
        true
    }

    /// Register the session under one additional identity (joiner)
    pub fn insert_for(&self, identity: &str, session: &Arc<MatchSession>) {
        self.sessions
            .lock()
            .insert(identity.to_string(), session.clone());
    }

    /// Drop every entry pointing at this session
    pub fn remove_session(&self, session: &Arc<MatchSession>) {
        self.sessions
            .lock()
            .retain(|_, s| !Arc::ptr_eq(s, session));
    }

    /// Drop this identity's entry when its stored channel was superseded.
    /// Called on (re)connect before any new session can be created.
    pub fn reclaim(&self, identity: &str, current_channel: ChannelId) -> Option<Arc<MatchSession>> {
        let mut sessions = self.sessions.lock();
        let stale = sessions.get(identity).is_some_and(|session| {
            session
                .participants()
                .iter()
                .any(|slot| slot.identity == identity && slot.channel != current_channel)
        });
        if stale {
            sessions.remove(identity)
        } else {
            None
        }
    }

    /// All matches still waiting for a joiner whose owner passes the
    /// liveness check. A disconnected owner's lobby is hidden here; the
    /// entry itself is reaped on the next join attempt or reconnect.
    pub fn list_waiting<F>(&self, mut owner_live: F) -> Vec<GameListEntry>
    where
        F: FnMut(&PlayerSlot) -> bool,
    {
        self.sessions
            .lock()
            .values()
            .filter(|s| s.phase() == GamePhase::Waiting)
            .filter_map(|s| {
                let owner = s.owner();
                owner_live(&owner).then(|| GameListEntry {
                    id: s.id,
                    owner: owner.identity,
                    alias: owner.alias,
                    state: GamePhase::Waiting,
                })
            })
            .collect()
    }

    pub fn active_matches(&self) -> usize {
        let sessions = self.sessions.lock();
        let mut seen = Vec::new();
        for session in sessions.values() {
            if !seen.iter().any(|s| Arc::ptr_eq(s, session)) {
                seen.push(session.clone());
            }
        }
        seen.len()
    }
}

impl Default for MatchRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Matchmaking service: create/list/join/quick-match plus input routing.
/// Matchmaking is pull-based listing; there is no automated queue.
pub struct MatchmakingService {
    registry: Arc<MatchRegistry>,
    directory: Arc<ConnectionDirectory>,
    store: Arc<ResultStore>,
    tournament_tx: mpsc::UnboundedSender<TournamentEvent>,
    default_max_score: u32,
    countdown_secs: u32,
}

impl MatchmakingService {
    pub fn new(
        registry: Arc<MatchRegistry>,
        directory: Arc<ConnectionDirectory>,
        store: Arc<ResultStore>,
        tournament_tx: mpsc::UnboundedSender<TournamentEvent>,
        default_max_score: u32,
        countdown_secs: u32,
    ) -> Self {
        Self {
            registry,
            directory,
            store,
            tournament_tx,
            default_max_score,
            countdown_secs,
        }
    }

    pub fn registry(&self) -> &Arc<MatchRegistry> {
        &self.registry
    }

    fn context(&self) -> SessionContext {
        SessionContext {
            directory: self.directory.clone(),
            store: self.store.clone(),
            tournament_tx: self.tournament_tx.clone(),
        }
    }

    fn notify_error(&self, identity: &str, message: &str, code: u16) {
        self.directory.send(
            identity,
            ServerMsg::Error(ErrorData {
                message: message.to_string(),
                code,
            }),
        );
    }

    fn current_slot(&self, identity: &str, alias: &str) -> Option<PlayerSlot> {
        self.directory.current(identity).map(|channel| PlayerSlot {
            identity: identity.to_string(),
            alias: alias.to_string(),
            channel,
        })
    }

    /// Spawn the session task; cleanup and bracket notification run after the
    /// session completes, in that order, so a finished tournament round no
    /// longer occupies its players' registry slots when the next round is
    /// created.
    fn spawn_session(&self, session: Arc<MatchSession>) {
        let ctx = self.context();
        let registry = self.registry.clone();
        let tournament_tx = self.tournament_tx.clone();

        tokio::spawn(async move {
            session.clone().run(ctx).await;

            registry.remove_session(&session);
            if let Some(tournament_id) = session.tournament_id {
                if let Some(winner) = session.winner() {
                    let _ = tournament_tx.send(TournamentEvent {
                        tournament_id,
                        winner,
                    });
                }
            }
            info!(match_id = %session.id, "match removed from registry");
        });
    }

    /// Handle a `create_game` request
    pub fn create_match(&self, identity: &str, data: CreateGameData) {
        if self.registry.contains(identity) {
            warn!(identity, "create rejected: already in a match");
            self.notify_error(identity, "already in a match", ERR_CREATE_REJECTED);
            return;
        }

        let Some(creator) = self.current_slot(identity, &data.player_alias) else {
            return;
        };
        let max_score = data.max_score.unwrap_or(self.default_max_score).max(1);

        match data.game_mode {
            GameMode::Local => {
                let opponent = data
                    .local_opponent
                    .unwrap_or_else(|| "Player2".to_string());
                let session = Arc::new(MatchSession::new_local(
                    creator,
                    opponent,
                    max_score,
                    self.countdown_secs,
                ));
                if !self.registry.insert(&session) {
                    self.notify_error(identity, "already in a match", ERR_CREATE_REJECTED);
                    return;
                }
                info!(identity, match_id = %session.id, "local match created");
                self.spawn_session(session);
            }
            GameMode::Remote => {
                let session = Arc::new(MatchSession::new_remote(
                    creator,
                    max_score,
                    self.countdown_secs,
                ));
                if !self.registry.insert(&session) {
                    self.notify_error(identity, "already in a match", ERR_CREATE_REJECTED);
                    return;
                }
                self.directory.send(
                    identity,
                    ServerMsg::GameCreated(GameCreatedData {
                        game_id: session.id,
                    }),
                );
                info!(identity, match_id = %session.id, "remote match created, waiting for joiner");
            }
        }
    }

    /// Handle a `game_list` request. Lobbies whose owner has since
    /// disconnected are filtered out so the list never advertises a dead
    /// game.
    pub fn list_open(&self, identity: &str) {
        let games = self
            .registry
            .list_waiting(|owner| self.directory.is_current(&owner.identity, owner.channel));
        self.directory
            .send(identity, ServerMsg::GameList(GameListData { games }));
    }

    /// Handle a `join_game` request
    pub fn join_match(&self, identity: &str, data: JoinGameData) {
        if self.registry.contains(identity) {
            self.notify_error(identity, "already in a match", ERR_JOIN_REJECTED);
            return;
        }

        let Some(session) = self.registry.get_by_id(data.game_id) else {
            self.notify_error(identity, "no such game", ERR_JOIN_REJECTED);
            return;
        };

        // The owner may have vanished since creating the lobby entry.
        let owner = session.owner();
        if !self.directory.is_current(&owner.identity, owner.channel) {
            self.registry.remove_session(&session);
            self.notify_error(identity, "game no longer available", ERR_JOIN_REJECTED);
            return;
        }

        let Some(joiner) = self.current_slot(identity, &data.player_alias) else {
            return;
        };

        if !session.join(joiner) {
            self.notify_error(identity, "game cannot be joined", ERR_JOIN_REJECTED);
            return;
        }

        self.registry.insert_for(identity, &session);
        info!(identity, match_id = %session.id, "joined match");
        self.spawn_session(session);
    }

    /// Start a remote match immediately for two users who agreed out-of-band
    /// (invite/accept handshake). Fails when either identity already owns an
    /// active session: a participant is in at most one match at a time.
    pub fn quick_match(&self, identity_a: &str, identity_b: &str) -> bool {
        let (Some(left), Some(right)) = (
            self.current_slot(identity_a, identity_a),
            self.current_slot(identity_b, identity_b),
        ) else {
            warn!(identity_a, identity_b, "quick match rejected: participant offline");
            return false;
        };

        let session = Arc::new(MatchSession::new_pair(
            left,
            right,
            self.default_max_score,
            self.countdown_secs,
            None,
            GamePhase::Countdown,
        ));
        if !self.registry.insert(&session) {
            warn!(identity_a, identity_b, "quick match rejected: busy participant");
            return false;
        }
        info!(identity_a, identity_b, match_id = %session.id, "quick match started");
        self.spawn_session(session);
        true
    }

    /// Create and start a tournament round. Semifinals skip the session
    /// countdown (the bracket ran one for all entrants); the final runs its
    /// own. Returns false without starting anything when either player
    /// already holds a registry slot; the bracket resolves that as a forfeit.
    pub fn start_tournament_match(
        &self,
        tournament_id: Uuid,
        left: PlayerSlot,
        right: PlayerSlot,
        phase: GamePhase,
    ) -> bool {
        let session = Arc::new(MatchSession::new_pair(
            left,
            right,
            self.default_max_score,
            self.countdown_secs,
            Some(tournament_id),
            phase,
        ));
        if !self.registry.insert(&session) {
            warn!(
                %tournament_id,
                match_id = %session.id,
                "tournament round blocked by an existing match"
            );
            return false;
        }
        info!(
            %tournament_id,
            match_id = %session.id,
            "tournament match started"
        );
        self.spawn_session(session);
        true
    }

    /// Invalidate any registry entry still referencing a superseded channel
    /// for this identity. Called right after a (re)connect registers the new
    /// channel.
    pub fn reclaim_on_reconnect(&self, identity: &str, current_channel: ChannelId) {
        if let Some(session) = self.registry.reclaim(identity, current_channel) {
            info!(identity, match_id = %session.id, "reclaimed stale session on reconnect");
        }
    }

    /// Route a paddle input to the sender's session. The embedded user id
    /// must match the identity the channel is bound to.
    pub fn handle_input(&self, identity: &str, data: InputData) {
        if data.user_id != identity {
            warn!(
                identity,
                claimed = %data.user_id,
                "input user id mismatch"
            );
            self.notify_error(identity, "user id mismatch", ERR_IDENTITY_MISMATCH);
            return;
        }

        if let Some(session) = self.registry.get(identity) {
            session.apply_input(identity, data.up, data.paddle);
        }
    }
}
