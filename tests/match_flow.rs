//! End-to-end flows through the service layer: lobby, match lifecycle,
//! disconnect forfeits, and a full tournament bracket.
//!
//! These tests drive the same service objects the WebSocket handler
//! dispatches to and read server messages from the connection directory's
//! outbound channels, so everything above the socket itself is covered.
//! Countdowns are configured to zero to keep the tests fast; match endings
//! are forced through disconnects rather than played-out rallies.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use pong_match_server::app::AppState;
use pong_match_server::config::Config;
use pong_match_server::ws::protocol::{
    CreateGameData, CreateTournamentData, GameMode, GamePhase, JoinGameData, ServerMsg,
};

fn test_config() -> Config {
    Config {
        server_addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
        log_level: "warn".to_string(),
        client_origin: "http://localhost:5173".to_string(),
        match_db_url: None,
        match_db_service_key: None,
        max_score: 10,
        countdown_secs: 0,
    }
}

/// Build the full state graph and spawn the tournament orchestrator, exactly
/// as the binary does at startup.
fn start_state() -> AppState {
    let (state, tournament_rx) = AppState::new(test_config());
    let tournaments = state.tournaments.clone();
    tokio::spawn(async move {
        tournaments.run(tournament_rx).await;
    });
    state
}

/// Read messages until one matches, dropping everything else (tick snapshots
/// mostly). Panics after the deadline.
async fn wait_for<F>(rx: &mut mpsc::UnboundedReceiver<ServerMsg>, mut pred: F) -> ServerMsg
where
    F: FnMut(&ServerMsg) -> bool,
{
    let deadline = Duration::from_secs(5);
    timeout(deadline, async {
        loop {
            let msg = rx.recv().await.expect("channel closed while waiting");
            if pred(&msg) {
                return msg;
            }
        }
    })
    .await
    .expect("timed out waiting for message")
}

fn create_remote(state: &AppState, identity: &str, alias: &str) {
    state.matchmaking.create_match(
        identity,
        CreateGameData {
            player_alias: alias.to_string(),
            game_mode: GameMode::Remote,
            local_opponent: None,
            max_score: None,
        },
    );
}

#[tokio::test]
async fn remote_match_reaches_playing_and_broadcasts_snapshots() {
    let state = start_state();
    let (_ada_ch, mut ada_rx) = state.directory.register("ada");
    let (_bob_ch, mut bob_rx) = state.directory.register("bob");

    create_remote(&state, "ada", "Ada");
    let game_id = match wait_for(&mut ada_rx, |m| matches!(m, ServerMsg::GameCreated(_))).await {
        ServerMsg::GameCreated(data) => data.game_id,
        _ => unreachable!(),
    };

    state.matchmaking.join_match(
        "bob",
        JoinGameData {
            game_id,
            player_alias: "Bob".to_string(),
        },
    );

    // Both sides see the countdown and then authoritative snapshots.
    for rx in [&mut ada_rx, &mut bob_rx] {
        wait_for(rx, |m| matches!(m, ServerMsg::Countdown(_))).await;
        let msg = wait_for(rx, |m| matches!(m, ServerMsg::GameState(_))).await;
        match msg {
            ServerMsg::GameState(data) => {
                assert_eq!(data.game.status, GamePhase::Playing);
                assert_eq!(data.game.max_score, 10);
                assert_eq!(data.game.scores.len(), 2);
                assert_eq!(data.game.scores[0].alias, "Ada");
                assert_eq!(data.game.scores[1].alias, "Bob");
            }
            _ => unreachable!(),
        }
    }
}

#[tokio::test]
async fn disconnect_forfeits_to_the_remaining_player() {
    let state = start_state();
    let (_ada_ch, mut ada_rx) = state.directory.register("ada");
    let (bob_ch, _bob_rx) = state.directory.register("bob");

    create_remote(&state, "ada", "Ada");
    let game_id = match wait_for(&mut ada_rx, |m| matches!(m, ServerMsg::GameCreated(_))).await {
        ServerMsg::GameCreated(data) => data.game_id,
        _ => unreachable!(),
    };
    state.matchmaking.join_match(
        "bob",
        JoinGameData {
            game_id,
            player_alias: "Bob".to_string(),
        },
    );

    // Wait until the match is live, then drop Bob's connection.
    wait_for(&mut ada_rx, |m| matches!(m, ServerMsg::GameState(_))).await;
    state.directory.unregister("bob", bob_ch);

    let msg = wait_for(&mut ada_rx, |m| matches!(m, ServerMsg::GameOver(_))).await;
    match msg {
        ServerMsg::GameOver(notice) => {
            assert!(notice.value.contains("Ada wins"), "got: {}", notice.value);
            assert!(notice.value.contains("disconnected"), "got: {}", notice.value);
        }
        _ => unreachable!(),
    }

    // The registry frees both slots once the session task exits.
    timeout(Duration::from_secs(5), async {
        while state.match_registry.active_matches() != 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("registry entries not cleaned up");

    assert!(!state.match_registry.contains("ada"));
    assert!(!state.match_registry.contains("bob"));
}

#[tokio::test]
async fn local_match_runs_over_a_single_connection() {
    let state = start_state();
    let (_ch, mut rx) = state.directory.register("ada");

    state.matchmaking.create_match(
        "ada",
        CreateGameData {
            player_alias: "Ada".to_string(),
            game_mode: GameMode::Local,
            local_opponent: Some("Guest".to_string()),
            max_score: Some(3),
        },
    );

    // No waiting phase: countdown, then snapshots, on the one connection.
    wait_for(&mut rx, |m| matches!(m, ServerMsg::Countdown(_))).await;
    let msg = wait_for(&mut rx, |m| matches!(m, ServerMsg::GameState(_))).await;
    match msg {
        ServerMsg::GameState(data) => {
            assert_eq!(data.game.status, GamePhase::Playing);
            assert_eq!(data.game.max_score, 3);
            assert_eq!(data.game.scores[0].alias, "Ada");
            assert_eq!(data.game.scores[1].alias, "Guest");
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn tournament_runs_semifinals_final_and_announces_champion() {
    let state = start_state();
    let (_ada_ch, mut ada_rx) = state.directory.register("ada");
    let (bob_ch, mut bob_rx) = state.directory.register("bob");
    let (carol_ch, mut carol_rx) = state.directory.register("carol");
    let (dave_ch, _dave_rx) = state.directory.register("dave");

    state.tournaments.create_tournament(
        "ada",
        CreateTournamentData {
            player_alias: "Ada".to_string(),
        },
    );
    let tournament_id =
        match wait_for(&mut ada_rx, |m| matches!(m, ServerMsg::GameCreated(_))).await {
            ServerMsg::GameCreated(data) => data.game_id,
            _ => unreachable!(),
        };

    for (identity, alias) in [("bob", "Bob"), ("carol", "Carol"), ("dave", "Dave")] {
        state.tournaments.join_tournament(
            identity,
            JoinGameData {
                game_id: tournament_id,
                player_alias: alias.to_string(),
            },
        );
    }

    // Shared bracket countdown reaches every entrant, then the semifinals
    // start directly in playing.
    wait_for(&mut bob_rx, |m| matches!(m, ServerMsg::Countdown(_))).await;
    wait_for(&mut ada_rx, |m| matches!(m, ServerMsg::GameState(_))).await;
    wait_for(&mut carol_rx, |m| matches!(m, ServerMsg::GameState(_))).await;

    // Semifinal forfeits: Ada and Carol advance.
    state.directory.unregister("bob", bob_ch);
    state.directory.unregister("dave", dave_ch);

    wait_for(&mut ada_rx, |m| matches!(m, ServerMsg::GameOver(_))).await;
    wait_for(&mut carol_rx, |m| matches!(m, ServerMsg::GameOver(_))).await;

    // The final pairs the two semifinal winners; it runs its own countdown.
    wait_for(&mut ada_rx, |m| matches!(m, ServerMsg::Countdown(_))).await;
    wait_for(&mut carol_rx, |m| matches!(m, ServerMsg::GameState(_))).await;

    // Final forfeit: Ada is champion.
    state.directory.unregister("carol", carol_ch);

    let msg = wait_for(&mut ada_rx, |m| matches!(m, ServerMsg::TournamentEnd(_))).await;
    match msg {
        ServerMsg::TournamentEnd(notice) => {
            assert_eq!(notice.value, "Ada wins the tournament");
        }
        _ => unreachable!(),
    }

    // The bracket is dropped after the final.
    timeout(Duration::from_secs(5), async {
        while state.tournaments.open_count() != 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("bracket not cleaned up");
}

#[tokio::test]
async fn entrant_who_starts_a_match_mid_bracket_forfeits_their_round() {
    let state = start_state();
    let (_ada_ch, mut ada_rx) = state.directory.register("ada");
    let (_bob_ch, mut bob_rx) = state.directory.register("bob");
    let (carol_ch, mut carol_rx) = state.directory.register("carol");
    let (dave_ch, _dave_rx) = state.directory.register("dave");

    state.tournaments.create_tournament(
        "ada",
        CreateTournamentData {
            player_alias: "Ada".to_string(),
        },
    );
    let tournament_id =
        match wait_for(&mut ada_rx, |m| matches!(m, ServerMsg::GameCreated(_))).await {
            ServerMsg::GameCreated(data) => data.game_id,
            _ => unreachable!(),
        };

    for (identity, alias) in [("bob", "Bob"), ("carol", "Carol")] {
        state.tournaments.join_tournament(
            identity,
            JoinGameData {
                game_id: tournament_id,
                player_alias: alias.to_string(),
            },
        );
    }

    // Bob starts a local match before the bracket fills. His registry slot
    // was still empty, so the creation is accepted.
    state.matchmaking.create_match(
        "bob",
        CreateGameData {
            player_alias: "Bob".to_string(),
            game_mode: GameMode::Local,
            local_opponent: Some("Guest".to_string()),
            max_score: None,
        },
    );
    let bob_local = state.match_registry.get("bob").expect("local match bound");

    // Fourth entrant starts the bracket.
    state.tournaments.join_tournament(
        "dave",
        JoinGameData {
            game_id: tournament_id,
            player_alias: "Dave".to_string(),
        },
    );

    // Bob's local match keeps playing and keeps its registry slot; it is
    // never displaced by the semifinal.
    wait_for(&mut bob_rx, |m| matches!(m, ServerMsg::GameState(_))).await;
    let still_bound = state.match_registry.get("bob").expect("slot survived");
    assert!(Arc::ptr_eq(&bob_local, &still_bound));

    // Carol v Dave plays out; Dave forfeits by disconnecting.
    wait_for(&mut carol_rx, |m| matches!(m, ServerMsg::GameState(_))).await;
    state.directory.unregister("dave", dave_ch);
    wait_for(&mut carol_rx, |m| matches!(m, ServerMsg::GameOver(_))).await;

    // Ada advanced by Bob's forfeit, so the final is Ada v Carol.
    wait_for(&mut carol_rx, |m| matches!(m, ServerMsg::Countdown(_))).await;
    state.directory.unregister("carol", carol_ch);

    let msg = wait_for(&mut ada_rx, |m| matches!(m, ServerMsg::TournamentEnd(_))).await;
    match msg {
        ServerMsg::TournamentEnd(notice) => {
            assert_eq!(notice.value, "Ada wins the tournament");
        }
        _ => unreachable!(),
    }
}
