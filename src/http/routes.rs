//! HTTP route definitions

use axum::{
    extract::State,
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::app::AppState;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // CORS configuration - support multiple origins (comma-separated in CLIENT_ORIGIN)
    let allowed_origins: Vec<header::HeaderValue> = state
        .config
        .client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<header::HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/internal/invite-accepted", post(invite_accepted_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    connected_players: usize,
    open_tournaments: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.match_registry.active_matches(),
        connected_players: state.directory.connected_count(),
        open_tournaments: state.tournaments.open_count(),
    })
}

// ============================================================================
// Invite endpoint (called by the service that brokered the invite)
// ============================================================================

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InviteAcceptedRequest {
    identity_a: String,
    identity_b: String,
}

#[derive(Serialize)]
struct InviteAcceptedResponse {
    status: &'static str,
}

async fn invite_accepted_handler(
    State(state): State<AppState>,
    Json(req): Json<InviteAcceptedRequest>,
) -> Result<Json<InviteAcceptedResponse>, AppError> {
    if req.identity_a == req.identity_b {
        return Err(AppError::BadRequest(
            "a player cannot play themselves".to_string(),
        ));
    }

    if !state.matchmaking.quick_match(&req.identity_a, &req.identity_b) {
        return Err(AppError::Conflict(
            "a player is offline or already in a match".to_string(),
        ));
    }

    Ok(Json(InviteAcceptedResponse { status: "started" }))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
