use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use log::*;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Mutex, mpsc},
    time::interval,
};
use tokio_tungstenite::{
    WebSocketStream, accept_hdr_async,
    tungstenite::{
        Error, Message, Result,
        handshake::server::{Request, Response},
    },
};

use crate::{
    game_timer,
    handler::{host, player},
    heartbeat::{HeartbeatState, PING_INTERVAL},
    model::{
        client_message::ClientMessage,
        game::{Game, GameState, Phase, now_ms},
        server_message::{ServerMessage, send_msg},
    },
    persistence::SnapshotStore,
    scoring,
};

pub type Tx = mpsc::UnboundedSender<Message>;
pub type Rx = mpsc::UnboundedReceiver<Message>;

pub struct AppState {
    pub games: Mutex<HashMap<String, Game>>,
    pub store: SnapshotStore,
}

impl AppState {
    pub fn new(store: SnapshotStore) -> Self {
        AppState {
            games: Mutex::new(HashMap::new()),
            store,
        }
    }
}

/// Write the game's snapshot, logging on failure. Returns whether the write
/// committed; callers answering a client should abort before broadcasting
/// when it did not.
pub async fn persist(store: &SnapshotStore, game: &Game) -> bool {
    match store.save(&game.game_id, &game.state).await {
        Ok(()) => true,
        Err(e) => {
            error!("Failed to persist game {}: {e:#}", game.game_id);
            false
        }
    }
}

pub async fn start_ws_server(listener: TcpListener, app_state: Arc<AppState>) {
    let addr = match listener.local_addr() {
        Ok(addr) => addr.to_string(),
        Err(_) => "<unknown>".to_string(),
    };
    info!("Listening on: {addr}");

    while let Ok((stream, peer)) = listener.accept().await {
        debug!("Peer address: {peer}");
        tokio::spawn(accept_connection(stream, app_state.clone()));
    }
}

async fn accept_connection(stream: TcpStream, app_state: Arc<AppState>) {
    if let Err(e) = handle_connection(stream, app_state).await {
        match e {
            Error::ConnectionClosed | Error::Protocol(_) | Error::Utf8 => (),
            err => error!("Error processing connection: {err}"),
        }
    }
}

/// Game ids double as snapshot file names, so they are restricted to a safe
/// alphabet (UUIDs pass untouched).
fn is_valid_game_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

async fn handle_connection(stream: TcpStream, app_state: Arc<AppState>) -> Result<()> {
    let mut game_id: Option<String> = None;
    let mut is_host = false;

    let callback = |request: &Request, response: Response| {
        if let Some(query) = request.uri().query() {
            for pair in query.split('&') {
                if let Some((key, value)) = pair.split_once('=') {
                    match key {
                        "game" => game_id = Some(value.to_string()),
                        "host" => is_host = value == "true",
                        _ => {}
                    }
                }
            }
        }
        Ok(response)
    };

    let mut ws_stream = accept_hdr_async(stream, callback).await?;

    match game_id {
        Some(game_id) if is_valid_game_id(&game_id) => {
            admit(app_state, ws_stream, game_id, is_host).await;
        }
        _ => {
            warn!("Connection rejected: missing or invalid game id");
            let error = ServerMessage::error("A valid game id is required to connect");
            if let Ok(msg) = serde_json::to_string(&error) {
                let _ = ws_stream.send(Message::text(msg)).await;
            }
        }
    }
    Ok(())
}

/// Restore invariants on a freshly loaded snapshot: sockets do not survive a
/// restart, and a question whose deadline passed while the process was down
/// is closed out immediately.
fn recover_loaded_state(state: &mut GameState) {
    state.host_connected = false;
    for player in &mut state.players {
        player.connected = false;
    }
    if state.phase != Phase::Question {
        return;
    }
    let expired = match (state.question_start_time, state.current_question()) {
        (Some(start), Some(question)) => {
            now_ms() >= start + u64::from(question.timer_seconds) * 1000
        }
        _ => true,
    };
    if expired {
        scoring::score_current_question(state);
        state.phase = Phase::Leaderboard;
        state.timer_paused = false;
        state.paused_at_seconds_left = None;
    }
}

async fn admit(
    app_state: Arc<AppState>,
    mut ws_stream: WebSocketStream<TcpStream>,
    game_id: String,
    is_host: bool,
) {
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let admitted: std::result::Result<(u64, bool), String> = {
        let mut games = app_state.games.lock().await;

        // First contact for this game id instantiates the coordinator; the
        // lock serializes that initialization against concurrent connects.
        if !games.contains_key(&game_id) {
            let state = match app_state.store.load(&game_id).await {
                Ok(Some(mut state)) => {
                    recover_loaded_state(&mut state);
                    info!("Restored game {game_id} from snapshot");
                    state
                }
                Ok(None) => {
                    info!("Created game {game_id}");
                    GameState::new()
                }
                Err(e) => {
                    error!("Failed to load snapshot for game {game_id}: {e:#}");
                    let msg = serde_json::to_string(&ServerMessage::error(
                        "Failed to load saved game state",
                    ))
                    .unwrap_or_default();
                    drop(games);
                    let _ = ws_stream.send(Message::text(msg)).await;
                    return;
                }
            };
            let game = Game::new(game_id.clone(), state);
            persist(&app_state.store, &game).await;
            games.insert(game_id.clone(), game);
        }

        let Some(game) = games.get_mut(&game_id) else {
            return;
        };

        if is_host && game.has_host_session() {
            Err("Game already has an active host".to_string())
        } else {
            let session_id = game.add_session(tx.clone(), is_host);
            let mut needs_end = false;

            if is_host {
                game.state.host_connected = true;
                if game.state.phase == Phase::Question && game.state.timer_paused {
                    let restored = game.state.paused_at_seconds_left.unwrap_or(0);
                    game.state.timer_paused = false;
                    game.state.paused_at_seconds_left = None;
                    if restored == 0 {
                        needs_end = true;
                    } else {
                        game.current_seconds_left = restored;
                        game_timer::start_ticker(game, &app_state);
                        persist(&app_state.store, game).await;
                        game.broadcast(&ServerMessage::GameResumed);
                        game.broadcast(&ServerMessage::TimerTick {
                            seconds_left: restored,
                        });
                    }
                } else {
                    persist(&app_state.store, game).await;
                }
            }

            game.send_game_state_to(session_id);
            needs_end |= catch_up(game, &app_state, session_id);
            Ok((session_id, needs_end))
        }
    };

    match admitted {
        Err(message) => {
            warn!("Connection to game {game_id} rejected: {message}");
            if let Ok(msg) = serde_json::to_string(&ServerMessage::error(message)) {
                let _ = ws_stream.send(Message::text(msg)).await;
            }
        }
        Ok((session_id, needs_end)) => {
            if needs_end {
                game_timer::end_question(&app_state, &game_id).await;
            }
            info!("Session {session_id} connected to game {game_id} (host: {is_host})");
            run_session(ws_stream, &app_state, rx, tx, &game_id, session_id, is_host).await;
            handle_close(&app_state, &game_id, session_id).await;
        }
    }
}

/// Send a freshly connected (or rejoined) session the minimum messages that
/// place it in the current phase. Returns true when the caller must close
/// out the current question after releasing the games lock.
pub fn catch_up(game: &mut Game, app_state: &Arc<AppState>, session_id: u64) -> bool {
    let mut needs_end = false;
    match game.state.phase {
        Phase::Lobby => {}
        Phase::Question => {
            game.send_question_start_to(session_id);
            let remaining = if game.state.timer_paused {
                game.state.paused_at_seconds_left.unwrap_or(0)
            } else if game.ticker_running() {
                game.current_seconds_left
            } else {
                // Nobody was connected to keep the countdown alive; rebuild
                // it from the stored question start.
                let remaining = game.wall_clock_remaining();
                if !game.state.question_scored {
                    if remaining > 0 {
                        game.current_seconds_left = remaining;
                        game_timer::start_ticker(game, app_state);
                    } else {
                        needs_end = true;
                    }
                }
                remaining
            };
            game.send_to(
                session_id,
                &ServerMessage::TimerTick {
                    seconds_left: remaining,
                },
            );
        }
        Phase::Leaderboard => {
            game.send_to(
                session_id,
                &ServerMessage::LeaderboardUpdate {
                    leaderboard: scoring::build_leaderboard(&game.state),
                },
            );
        }
        Phase::Podium | Phase::Finished => {
            let leaderboard = scoring::build_leaderboard(&game.state);
            for position in [3usize, 2, 1] {
                game.send_to(
                    session_id,
                    &ServerMessage::PodiumReveal {
                        position,
                        player: leaderboard.get(position - 1).cloned(),
                    },
                );
            }
            if game.state.phase == Phase::Finished {
                game.send_to(
                    session_id,
                    &ServerMessage::GameFinished {
                        final_leaderboard: leaderboard,
                    },
                );
            }
        }
    }
    needs_end
}

async fn run_session(
    ws_stream: WebSocketStream<TcpStream>,
    app_state: &Arc<AppState>,
    mut rx: Rx,
    tx: Tx,
    game_id: &str,
    session_id: u64,
    is_host: bool,
) {
    let (mut ws_write, mut ws_read) = ws_stream.split();
    let mut heartbeat = HeartbeatState::new();
    let mut ping_interval = interval(PING_INTERVAL);

    loop {
        tokio::select! {
            // Outgoing messages from the session channel
            Some(msg) = rx.recv() => {
                if ws_write.send(msg).await.is_err() {
                    break;
                }
            }

            // Incoming messages from the WebSocket
            msg_result = ws_read.next() => {
                match msg_result {
                    Some(Ok(Message::Pong(_))) => {
                        heartbeat.record_pong();
                    }
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received message: {text}");
                        process_message(&text, app_state, game_id, session_id, is_host, &tx).await;
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Err(_)) => {
                        break;
                    }
                    _ => {} // Ignore Ping (auto-handled by tungstenite), Binary
                }
            }

            // Heartbeat ping timer
            _ = ping_interval.tick() => {
                if !heartbeat.is_alive() {
                    info!("Session {session_id} in game {game_id} timed out (no pong received)");
                    break;
                }
                if ws_write.send(Message::Ping(vec![].into())).await.is_err() {
                    break;
                }
            }
        }
    }
}

/// Decode one inbound message, check the socket role, and route to the
/// matching handler. Unknown types and malformed JSON are answered with an
/// error and mutate nothing.
async fn process_message(
    text: &str,
    app_state: &Arc<AppState>,
    game_id: &str,
    session_id: u64,
    is_host: bool,
    tx: &Tx,
) {
    let msg = match serde_json::from_str::<ClientMessage>(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!("Failed to parse message from session {session_id}: {e}");
            send_msg(tx, &ServerMessage::error("Invalid message"));
            return;
        }
    };

    if msg.requires_host() && !is_host {
        send_msg(tx, &ServerMessage::error("This action requires the host role"));
        return;
    }
    if !msg.requires_host() && is_host {
        send_msg(tx, &ServerMessage::error("The host cannot act as a player"));
        return;
    }

    match msg {
        ClientMessage::HostCreateQuiz { quiz } => {
            host::create_quiz(app_state, game_id, quiz, tx).await;
        }
        ClientMessage::HostStartGame => {
            host::start_game(app_state, game_id, tx).await;
        }
        ClientMessage::HostNextQuestion => {
            host::next_question(app_state, game_id, tx).await;
        }
        ClientMessage::HostShowLeaderboard => {
            game_timer::show_leaderboard(app_state, game_id).await;
        }
        ClientMessage::HostShowPodium => {
            game_timer::show_podium(app_state, game_id).await;
        }
        ClientMessage::PlayerJoin { nickname } => {
            player::join(app_state, game_id, session_id, nickname, tx).await;
        }
        ClientMessage::PlayerRejoin {
            player_id,
            nickname,
        } => {
            player::rejoin(app_state, game_id, session_id, player_id, nickname, tx).await;
        }
        ClientMessage::PlayerAnswer {
            question_id,
            answer_indices,
        } => {
            player::answer(app_state, game_id, session_id, question_id, answer_indices, tx).await;
        }
    }
}

/// Socket closed: update connection bookkeeping, pause the countdown when
/// the host drops mid-question, and stop the ticker once nobody is left.
async fn handle_close(app_state: &Arc<AppState>, game_id: &str, session_id: u64) {
    let mut games = app_state.games.lock().await;
    let Some(game) = games.get_mut(game_id) else {
        return;
    };
    let Some(session) = game.remove_session(session_id) else {
        return;
    };

    if session.is_host {
        info!("Host disconnected from game {game_id}");
        game.state.host_connected = false;
        if game.state.phase == Phase::Question
            && game.ticker_running()
            && !game.state.timer_paused
        {
            game_timer::pause_timer(game);
            persist(&app_state.store, game).await;
            game.broadcast(&ServerMessage::GamePaused {
                reason: "Host disconnected".to_string(),
            });
        } else {
            persist(&app_state.store, game).await;
        }
    } else if let Some(player_id) = session.player_id {
        if let Some(player) = game.state.find_player_mut(&player_id) {
            info!("Player {} disconnected from game {game_id}", player.nickname);
            player.connected = false;
        }
        persist(&app_state.store, game).await;
        game.broadcast(&ServerMessage::PlayerLeft {
            player_id,
            player_count: game.state.connected_player_count(),
        });
    }

    // Without sessions there is nobody to tick for.
    if game.sessions.is_empty() {
        game.stop_ticker();
    }
}
