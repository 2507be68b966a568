use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use serde_json::{Value, json};
use tower_http::cors::{Any, CorsLayer};

use crate::server::AppState;

/// Introspection surface for the gateway: health, and per-game PIN/phase for
/// games live in this process.
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/games/{game_id}/pin", get(game_pin))
        .route("/games/{game_id}/state", get(game_state))
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(app_state)
}

async fn health() -> &'static str {
    "OK"
}

async fn game_pin(
    State(app_state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let games = app_state.games.lock().await;
    match games.get(&game_id) {
        Some(game) => Ok(Json(json!({ "gamePin": game.state.game_pin }))),
        None => Err(StatusCode::NOT_FOUND),
    }
}

async fn game_state(
    State(app_state): State<Arc<AppState>>,
    Path(game_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    let games = app_state.games.lock().await;
    match games.get(&game_id) {
        Some(game) => Ok(Json(json!({
            "gamePin": game.state.game_pin,
            "phase": game.state.phase,
        }))),
        None => Err(StatusCode::NOT_FOUND),
    }
}
