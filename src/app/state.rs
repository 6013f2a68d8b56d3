//! Application state shared across routes

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::Config;
use crate::game::{MatchRegistry, MatchmakingService};
use crate::store::ResultStore;
use crate::tournament::{TournamentEvent, TournamentService};
use crate::ws::directory::ConnectionDirectory;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub directory: Arc<ConnectionDirectory>,
    pub match_registry: Arc<MatchRegistry>,
    pub matchmaking: Arc<MatchmakingService>,
    pub tournaments: Arc<TournamentService>,
    pub result_store: Arc<ResultStore>,
}

impl AppState {
    /// Build the state graph. The returned receiver carries match completion
    /// events for tournament brackets; the caller spawns
    /// `TournamentService::run` with it.
    pub fn new(config: Config) -> (Self, mpsc::UnboundedReceiver<TournamentEvent>) {
        let config = Arc::new(config);

        let directory = Arc::new(ConnectionDirectory::new());
        let match_registry = Arc::new(MatchRegistry::new());
        let result_store = Arc::new(ResultStore::new(&config));

        let (tournament_tx, tournament_rx) = mpsc::unbounded_channel();

        let matchmaking = Arc::new(MatchmakingService::new(
            match_registry.clone(),
            directory.clone(),
            result_store.clone(),
            tournament_tx,
            config.max_score,
            config.countdown_secs,
        ));

        let tournaments = Arc::new(TournamentService::new(
            matchmaking.clone(),
            directory.clone(),
            config.countdown_secs,
        ));

        let state = Self {
            config,
            directory,
            match_registry,
            matchmaking,
            tournaments,
            result_store,
        };
        (state, tournament_rx)
    }
}
