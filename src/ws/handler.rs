//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::protocol::{
    ClientMsg, Envelope, ErrorData, ServerMsg, ERR_UNKNOWN_TYPE, PONG_ENDPOINT,
};

/// Query parameters for WebSocket connection. Authentication happens at the
/// gateway in front of this service; it forwards the verified identity.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub identity: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> Response {
    info!(identity = %query.identity, "WebSocket upgrade");
    ws.on_upgrade(move |socket| handle_socket(socket, query.identity, state))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, identity: String, state: AppState) {
    info!(identity = %identity, "New WebSocket connection");

    // Bind the outbound channel first so every service sees the connection,
    // then drop any session entry left over from a previous connection.
    let (channel_id, outbound_rx) = state.directory.register(&identity);
    state.matchmaking.reclaim_on_reconnect(&identity, channel_id);
    state.tournaments.reclaim_on_reconnect(&identity, channel_id);

    let (ws_sink, ws_stream) = socket.split();

    run_session(&identity, ws_sink, ws_stream, outbound_rx, &state).await;

    // Cleanup on disconnect. A reconnect may already hold a newer channel;
    // unregister only tears down ours.
    state.directory.unregister(&identity, channel_id);

    info!(identity = %identity, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    identity: &str,
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_stream: futures::stream::SplitStream<WebSocket>,
    mut outbound_rx: mpsc::UnboundedReceiver<ServerMsg>,
    state: &AppState,
) {
    let rate_limiter = ConnectionRateLimiter::new();

    // Writer task: directory channel -> WebSocket, everything enveloped
    let writer_identity = identity.to_string();
    let writer_handle = tokio::spawn(async move {
        while let Some(msg) = outbound_rx.recv().await {
            if let Err(e) = send_msg(&mut ws_sink, msg).await {
                debug!(identity = %writer_identity, error = %e, "WebSocket send failed");
                break;
            }
        }
        debug!(identity = %writer_identity, "Outbound channel closed");
    });

    // Reader loop: WebSocket -> services
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(identity = %identity, "Rate limited input message");
                    continue;
                }

                match serde_json::from_str::<Envelope<ClientMsg>>(&text) {
                    Ok(envelope) if envelope.target_endpoint == PONG_ENDPOINT => {
                        dispatch(identity, envelope.payload, state);
                    }
                    Ok(envelope) => {
                        warn!(
                            identity = %identity,
                            endpoint = %envelope.target_endpoint,
                            "Message for unknown endpoint"
                        );
                        reject_unknown(identity, state);
                    }
                    Err(e) => {
                        warn!(identity = %identity, error = %e, "Failed to parse client message");
                        reject_unknown(identity, state);
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(identity = %identity, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(identity = %identity, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(identity = %identity, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Abort writer task
    writer_handle.abort();
}

/// Route one parsed message to the owning service. All handlers are
/// synchronous; session and bracket tasks do the async work.
fn dispatch(identity: &str, msg: ClientMsg, state: &AppState) {
    match msg {
        ClientMsg::CreateGame(data) => state.matchmaking.create_match(identity, data),
        ClientMsg::JoinGame(data) => state.matchmaking.join_match(identity, data),
        ClientMsg::GameList => state.matchmaking.list_open(identity),
        ClientMsg::CreateTournament(data) => state.tournaments.create_tournament(identity, data),
        ClientMsg::JoinTournament(data) => state.tournaments.join_tournament(identity, data),
        ClientMsg::TournamentList => state.tournaments.list(identity),
        ClientMsg::Input(data) => state.matchmaking.handle_input(identity, data),
    }
}

fn reject_unknown(identity: &str, state: &AppState) {
    state.directory.send(
        identity,
        ServerMsg::Error(ErrorData {
            message: "unknown message type".to_string(),
            code: ERR_UNKNOWN_TYPE,
        }),
    );
}

/// Send a message over WebSocket, wrapped in the standard envelope
async fn send_msg(
    sink: &mut futures::stream::SplitSink<WebSocket, Message>,
    msg: ServerMsg,
) -> Result<(), String> {
    let json = serde_json::to_string(&Envelope::new(msg)).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}
