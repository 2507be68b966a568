use std::env;
use std::sync::Arc;

use anyhow::Result;
use log::*;
use tokio::net::TcpListener;

use quizpin::{http, persistence::SnapshotStore, server::AppState, server::start_ws_server};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting quizpin backend");

    let store = SnapshotStore::from_env();
    let app_state = Arc::new(AppState::new(store));

    let ws_addr = env::var("QUIZPIN_WS_ADDR").unwrap_or_else(|_| "0.0.0.0:9090".to_string());
    let http_addr = env::var("QUIZPIN_HTTP_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

    let ws_listener = TcpListener::bind(&ws_addr).await?;
    let http_listener = TcpListener::bind(&http_addr).await?;
    info!("WebSocket on {ws_addr}, HTTP on {http_addr}");

    let ws_server = start_ws_server(ws_listener, app_state.clone());
    let http_app = http::router(app_state);

    tokio::select! {
        _ = ws_server => {},
        _ = axum::serve(http_listener, http_app) => {},
    }

    Ok(())
}
