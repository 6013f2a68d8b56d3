//! Four-player single-elimination tournaments
//!
//! A bracket collects exactly four entrants, runs one shared countdown, then
//! starts both semifinals. Match completions flow back through an event
//! channel drained by [`TournamentService::run`]; the third completion event
//! (the final) closes the bracket.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{info, warn};
use uuid::Uuid;

use crate::game::{MatchmakingService, PlayerSlot};
use crate::ws::directory::{ChannelId, ConnectionDirectory};
use crate::ws::protocol::{
    CountdownData, CreateTournamentData, ErrorData, GameCreatedData, GameListData, GameListEntry,
    GamePhase, JoinGameData, NoticeData, ServerMsg, ERR_TOURNAMENT_REJECTED,
};

/// Completion notice a match session emits when it belonged to a bracket
#[derive(Debug)]
pub struct TournamentEvent {
    pub tournament_id: Uuid,
    pub winner: PlayerSlot,
}

/// What the bracket wants done after recording a winner
enum Progress {
    /// Still waiting for the other semifinal
    None,
    /// Both semifinals decided: start the final
    StartFinal(PlayerSlot, PlayerSlot),
    /// Final decided: notify all entrants and drop the bracket
    Finished(Vec<PlayerSlot>, String),
}

struct BracketInner {
    phase: GamePhase,
    entrants: Vec<PlayerSlot>,
    winners: Vec<PlayerSlot>,
    final_started: bool,
}

/// One tournament bracket. Seeding is join order: entrants 1v2 and 3v4 play
/// the semifinals.
pub struct TournamentBracket {
    pub id: Uuid,
    inner: Mutex<BracketInner>,
}

const BRACKET_SIZE: usize = 4;

impl TournamentBracket {
    fn new(owner: PlayerSlot) -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: Mutex::new(BracketInner {
                phase: GamePhase::Waiting,
                entrants: vec![owner],
                winners: Vec::new(),
                final_started: false,
            }),
        }
    }

    fn phase(&self) -> GamePhase {
        self.inner.lock().phase
    }

    fn owner(&self) -> PlayerSlot {
        self.inner.lock().entrants[0].clone()
    }

    fn entrants(&self) -> Vec<PlayerSlot> {
        self.inner.lock().entrants.clone()
    }

    /// Add an entrant. Rejects once registration closed, on a duplicate
    /// identity, or on a duplicate alias (aliases label the bracket, they must
    /// be unambiguous). Returns whether the bracket is now full.
    fn add_entrant(&self, entrant: PlayerSlot) -> Result<bool, &'static str> {
        let mut inner = self.inner.lock();
        if inner.phase != GamePhase::Waiting {
            return Err("tournament already started");
        }
        if inner.entrants.len() >= BRACKET_SIZE {
            return Err("tournament is full");
        }
        if inner.entrants.iter().any(|e| e.identity == entrant.identity) {
            return Err("already entered");
        }
        if inner.entrants.iter().any(|e| e.alias == entrant.alias) {
            return Err("alias already taken");
        }
        inner.entrants.push(entrant);
        Ok(inner.entrants.len() == BRACKET_SIZE)
    }

    /// Record one match winner and decide what happens next.
    ///
    /// The first two completions are the semifinals; their winners meet in
    /// the final. The third completion is gated on `final_started` so a
    /// duplicate semifinal event cannot close the bracket early. Once the
    /// phase is `finished`, late events are dropped.
    fn record_winner(&self, winner: PlayerSlot) -> Progress {
        let mut inner = self.inner.lock();
        if inner.phase == GamePhase::Finished {
            return Progress::None;
        }

        inner.winners.push(winner);

        if inner.winners.len() == 2 && !inner.final_started {
            inner.final_started = true;
            let a = inner.winners[0].clone();
            let b = inner.winners[1].clone();
            return Progress::StartFinal(a, b);
        }

        if inner.winners.len() >= 3 && inner.final_started {
            inner.phase = GamePhase::Finished;
            let champion = inner.winners[inner.winners.len() - 1].alias.clone();
            return Progress::Finished(inner.entrants.clone(), champion);
        }

        Progress::None
    }
}

/// Tournament lifecycle service. Brackets are keyed by owner identity, same
/// one-per-owner rule as matches.
pub struct TournamentService {
    brackets: Mutex<HashMap<String, Arc<TournamentBracket>>>,
    matchmaking: Arc<MatchmakingService>,
    directory: Arc<ConnectionDirectory>,
    countdown_secs: u32,
}

impl TournamentService {
    pub fn new(
        matchmaking: Arc<MatchmakingService>,
        directory: Arc<ConnectionDirectory>,
        countdown_secs: u32,
    ) -> Self {
        Self {
            brackets: Mutex::new(HashMap::new()),
            matchmaking,
            directory,
            countdown_secs,
        }
    }

    pub fn open_count(&self) -> usize {
        self.brackets.lock().len()
    }

    fn notify_error(&self, identity: &str, message: &str) {
        self.directory.send(
            identity,
            ServerMsg::Error(ErrorData {
                message: message.to_string(),
                code: ERR_TOURNAMENT_REJECTED,
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

    fn find_by_id(&self, id: Uuid) -> Option<Arc<TournamentBracket>> {
        self.brackets
            .lock()
            .values()
            .find(|b| b.id == id)
            .cloned()
    }

    /// Handle a `create_tournament` request
    pub fn create_tournament(&self, identity: &str, data: CreateTournamentData) {
        {
            let brackets = self.brackets.lock();
            if brackets.contains_key(identity) {
                drop(brackets);
                self.notify_error(identity, "already hosting a tournament");
                return;
            }
        }

        // Entrants must be free: a participant is in at most one match, and
        // a bracket turns its entrants into participants.
        if self.matchmaking.registry().contains(identity) {
            self.notify_error(identity, "already in a match");
            return;
        }

        let Some(owner) = self.current_slot(identity, &data.player_alias) else {
            return;
        };

        let bracket = Arc::new(TournamentBracket::new(owner));
        let id = bracket.id;
        self.brackets.lock().insert(identity.to_string(), bracket);

        self.directory
            .send(identity, ServerMsg::GameCreated(GameCreatedData { game_id: id }));
        info!(identity, tournament_id = %id, "tournament created");
    }

    /// Drop a waiting bracket whose owner channel was superseded by a
    /// reconnect, mirroring the match registry reclaim. Started brackets are
    /// left alone; their sessions resolve disconnects themselves.
    pub fn reclaim_on_reconnect(&self, identity: &str, current_channel: ChannelId) {
        let mut brackets = self.brackets.lock();
        let stale = brackets.get(identity).is_some_and(|bracket| {
            bracket.phase() == GamePhase::Waiting && bracket.owner().channel != current_channel
        });
        if stale {
            if let Some(bracket) = brackets.remove(identity) {
                info!(identity, tournament_id = %bracket.id, "reclaimed stale tournament on reconnect");
            }
        }
    }

    /// Handle a `tournament_list` request. Brackets with a disconnected
    /// owner are hidden, like dead match lobbies.
    pub fn list(&self, identity: &str) {
        let games = self
            .brackets
            .lock()
            .values()
            .filter(|b| b.phase() == GamePhase::Waiting)
            .filter_map(|b| {
                let owner = b.owner();
                self.directory
                    .is_current(&owner.identity, owner.channel)
                    .then(|| GameListEntry {
                        id: b.id,
                        owner: owner.identity,
                        alias: owner.alias,
                        state: GamePhase::Waiting,
                    })
            })
            .collect();
        self.directory
            .send(identity, ServerMsg::TournamentList(GameListData { games }));
    }

    /// Handle a `join_tournament` request. The fourth entrant triggers the
    /// bracket start.
    pub fn join_tournament(self: &Arc<Self>, identity: &str, data: JoinGameData) {
        if self.matchmaking.registry().contains(identity) {
            self.notify_error(identity, "already in a match");
            return;
        }

        let Some(bracket) = self.find_by_id(data.game_id) else {
            self.notify_error(identity, "no such tournament");
            return;
        };

        // The owner may have vanished since opening the bracket.
        if bracket.phase() == GamePhase::Waiting {
            let owner = bracket.owner();
            if !self.directory.is_current(&owner.identity, owner.channel) {
                self.brackets
                    .lock()
                    .retain(|_, b| !Arc::ptr_eq(b, &bracket));
                self.notify_error(identity, "tournament no longer available");
                return;
            }
        }

        let Some(entrant) = self.current_slot(identity, &data.player_alias) else {
            return;
        };

        match bracket.add_entrant(entrant) {
            Ok(full) => {
                info!(identity, tournament_id = %bracket.id, "joined tournament");
                if full {
                    self.clone().start(bracket);
                }
            }
            Err(reason) => {
                warn!(identity, tournament_id = %bracket.id, reason, "tournament join rejected");
                self.notify_error(identity, reason);
            }
        }
    }

    /// Run the shared countdown for all four entrants, then start both
    /// semifinals. Semifinal sessions skip their own countdown and begin
    /// directly in `playing`.
    fn start(self: Arc<Self>, bracket: Arc<TournamentBracket>) {
        bracket.inner.lock().phase = GamePhase::Countdown;
        info!(tournament_id = %bracket.id, "tournament full, starting countdown");

        tokio::spawn(async move {
            let entrants = bracket.entrants();
            let mut remaining = self.countdown_secs;
            let mut ticker = interval(Duration::from_secs(1));

            loop {
                ticker.tick().await;
                if bracket.phase() != GamePhase::Countdown {
                    return;
                }
                for entrant in &entrants {
                    self.directory.send(
                        &entrant.identity,
                        ServerMsg::Countdown(CountdownData { value: remaining }),
                    );
                }
                if remaining == 0 {
                    break;
                }
                remaining -= 1;
            }

            bracket.inner.lock().phase = GamePhase::Playing;

            // Seed by join order: 1v2 and 3v4.
            self.start_round(
                bracket.id,
                entrants[0].clone(),
                entrants[1].clone(),
                GamePhase::Playing,
            );
            self.start_round(
                bracket.id,
                entrants[2].clone(),
                entrants[3].clone(),
                GamePhase::Playing,
            );
            info!(tournament_id = %bracket.id, "semifinals started");
        });
    }

    /// Start one round, or resolve it as a forfeit when a player got tied up
    /// in another match since joining. The occupied side loses, like a
    /// disconnect inside a running session.
    fn start_round(&self, tournament_id: Uuid, a: PlayerSlot, b: PlayerSlot, phase: GamePhase) {
        if self
            .matchmaking
            .start_tournament_match(tournament_id, a.clone(), b.clone(), phase)
        {
            return;
        }

        let winner = if self.matchmaking.registry().contains(&a.identity) {
            b
        } else {
            a
        };
        warn!(
            %tournament_id,
            winner = %winner.alias,
            "round forfeited by an occupied player"
        );
        self.notify_match_end(TournamentEvent {
            tournament_id,
            winner,
        });
    }

    fn notify_match_end(&self, event: TournamentEvent) {
        let Some(bracket) = self.find_by_id(event.tournament_id) else {
            warn!(tournament_id = %event.tournament_id, "event for unknown tournament");
            return;
        };

        match bracket.record_winner(event.winner) {
            Progress::None => {}
            Progress::StartFinal(a, b) => {
                info!(tournament_id = %bracket.id, "semifinals decided, starting final");
                // Finalists get a session-level countdown of their own.
                self.start_round(bracket.id, a, b, GamePhase::Countdown);
            }
            Progress::Finished(entrants, champion) => {
                info!(tournament_id = %bracket.id, champion, "tournament finished");
                for entrant in &entrants {
                    self.directory.send(
                        &entrant.identity,
                        ServerMsg::TournamentEnd(NoticeData {
                            value: format!("{champion} wins the tournament"),
                        }),
                    );
                }
                self.brackets
                    .lock()
                    .retain(|_, b| !Arc::ptr_eq(b, &bracket));
            }
        }
    }

    /// Orchestrator loop: drain match completion events until every sender is
    /// gone. Spawned once at startup.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<TournamentEvent>) {
        while let Some(event) = rx.recv().await {
            self.notify_match_end(event);
        }
    }
}
