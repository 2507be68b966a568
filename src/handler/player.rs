use std::sync::Arc;

use log::{info, warn};

use crate::{
    game_timer,
    model::{
        game::{MAX_NICKNAME_CHARS, MAX_PLAYERS, Phase, PlayerAnswer, now_ms, same_nickname},
        quiz::ANSWERS_PER_QUESTION,
        server_message::{ServerMessage, send_msg},
    },
    server::{AppState, Tx, catch_up, persist},
};

/// Admit a new player into the lobby.
pub async fn join(
    app_state: &Arc<AppState>,
    game_id: &str,
    session_id: u64,
    nickname: String,
    tx: &Tx,
) {
    let mut games = app_state.games.lock().await;
    let Some(game) = games.get_mut(game_id) else {
        return;
    };

    if game
        .session(session_id)
        .and_then(|s| s.player_id.as_ref())
        .is_some()
    {
        send_msg(tx, &ServerMessage::error("Already joined"));
        return;
    }
    if game.state.phase != Phase::Lobby {
        send_msg(tx, &ServerMessage::error("Game has already started"));
        return;
    }
    let nickname = nickname.trim().to_string();
    if nickname.is_empty() {
        send_msg(tx, &ServerMessage::error("Nickname must not be empty"));
        return;
    }
    if nickname.chars().count() > MAX_NICKNAME_CHARS {
        send_msg(
            tx,
            &ServerMessage::error(format!(
                "Nickname must be at most {MAX_NICKNAME_CHARS} characters"
            )),
        );
        return;
    }
    if game.state.nickname_taken(&nickname) {
        send_msg(tx, &ServerMessage::error("Nickname is already taken"));
        return;
    }
    if game.state.players.len() >= MAX_PLAYERS {
        send_msg(tx, &ServerMessage::error("Game is full"));
        return;
    }

    let player = game.state.add_player(nickname);
    if let Some(session) = game.session_mut(session_id) {
        session.player_id = Some(player.id.clone());
    }
    if !persist(&app_state.store, game).await {
        send_msg(tx, &ServerMessage::error("Failed to save game state"));
        return;
    }
    info!("Player {} joined game {game_id}", player.nickname);
    game.broadcast(&ServerMessage::PlayerJoined {
        player: player.view(),
        player_count: game.state.connected_player_count(),
    });
    game.send_game_state_to(session_id);
}

/// Reattach a returning player to their roster entry and replay the catch-up
/// sequence for the current phase.
pub async fn rejoin(
    app_state: &Arc<AppState>,
    game_id: &str,
    session_id: u64,
    player_id: String,
    nickname: String,
    tx: &Tx,
) {
    let needs_end = {
        let mut games = app_state.games.lock().await;
        let Some(game) = games.get_mut(game_id) else {
            return;
        };

        if game
            .session(session_id)
            .and_then(|s| s.player_id.as_ref())
            .is_some()
        {
            send_msg(tx, &ServerMessage::error("Already joined"));
            return;
        }

        match game.state.find_player(&player_id) {
            None => {
                // An unknown id in the lobby is just a stale client; let them
                // in as a fresh player.
                if game.state.phase == Phase::Lobby {
                    drop(games);
                    join(app_state, game_id, session_id, nickname, tx).await;
                } else {
                    warn!("Unknown player {player_id} tried to rejoin game {game_id}");
                    send_msg(tx, &ServerMessage::error("Unknown player"));
                }
                return;
            }
            Some(player) if !same_nickname(&player.nickname, &nickname) => {
                send_msg(tx, &ServerMessage::error("Nickname does not match"));
                return;
            }
            Some(_) => {}
        }
        if game.player_has_session(&player_id) {
            send_msg(tx, &ServerMessage::error("Player is already connected"));
            return;
        }

        let Some(player) = game.state.find_player_mut(&player_id) else {
            return;
        };
        player.connected = true;
        let player_view = player.view();
        if let Some(session) = game.session_mut(session_id) {
            session.player_id = Some(player_id.clone());
        }
        if !persist(&app_state.store, game).await {
            send_msg(tx, &ServerMessage::error("Failed to save game state"));
            return;
        }
        info!("Player {} rejoined game {game_id}", player_view.nickname);
        game.broadcast(&ServerMessage::PlayerRejoined {
            player: player_view,
            player_count: game.state.connected_player_count(),
        });
        game.send_game_state_to(session_id);
        catch_up(game, app_state, session_id)
    };

    if needs_end {
        game_timer::end_question(app_state, game_id).await;
    }
}

/// Record a player's answer for the current question. First answer wins;
/// when every connected player has locked in, the question ends early.
pub async fn answer(
    app_state: &Arc<AppState>,
    game_id: &str,
    session_id: u64,
    question_id: String,
    answer_indices: Vec<usize>,
    tx: &Tx,
) {
    let finish_early = {
        let mut games = app_state.games.lock().await;
        let Some(game) = games.get_mut(game_id) else {
            return;
        };

        if game.state.phase != Phase::Question {
            send_msg(tx, &ServerMessage::error("Answers are not open"));
            return;
        }
        let Some(player_id) = game.session(session_id).and_then(|s| s.player_id.clone()) else {
            send_msg(tx, &ServerMessage::error("Join the game before answering"));
            return;
        };
        let Some(question) = game.state.current_question() else {
            return;
        };
        if question.id != question_id {
            send_msg(
                tx,
                &ServerMessage::error("Answer does not match the current question"),
            );
            return;
        }
        let current_question_id = question.id.clone();

        let mut indices = answer_indices;
        indices.sort_unstable();
        indices.dedup();
        if indices.is_empty() {
            send_msg(tx, &ServerMessage::error("Select at least one answer"));
            return;
        }
        if indices.iter().any(|&i| i >= ANSWERS_PER_QUESTION) {
            send_msg(tx, &ServerMessage::error("Answer index out of range"));
            return;
        }

        let Some(player) = game.state.find_player_mut(&player_id) else {
            send_msg(tx, &ServerMessage::error("Join the game before answering"));
            return;
        };
        if player.answers.contains_key(&current_question_id) {
            send_msg(tx, &ServerMessage::error("Answer already submitted"));
            return;
        }
        player.answers.insert(
            current_question_id,
            PlayerAnswer {
                answer_indices: indices,
                timestamp: now_ms(),
            },
        );

        if !persist(&app_state.store, game).await {
            send_msg(tx, &ServerMessage::error("Failed to save game state"));
            return;
        }
        game.broadcast(&ServerMessage::AnswerReceived { player_id });

        game.ticker_running() && !game.state.timer_paused && game.all_connected_answered()
    };

    if finish_early {
        game_timer::end_question(app_state, game_id).await;
    }
}
