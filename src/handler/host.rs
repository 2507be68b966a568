use std::sync::Arc;

use log::{info, warn};
use tokio::time::sleep;

use crate::{
    game_timer::{self, GAME_START_DELAY},
    model::{
        game::Phase,
        quiz::Quiz,
        server_message::{ServerMessage, send_msg},
    },
    server::{AppState, Tx, persist},
};

/// Accept a quiz for the session. Any structural failure is answered on the
/// offending socket and nothing changes.
pub async fn create_quiz(app_state: &Arc<AppState>, game_id: &str, mut quiz: Quiz, tx: &Tx) {
    if let Err(reason) = quiz.validate() {
        warn!("Rejected quiz for game {game_id}: {reason}");
        send_msg(tx, &ServerMessage::error(reason));
        return;
    }
    quiz.normalize();

    let mut games = app_state.games.lock().await;
    let Some(game) = games.get_mut(game_id) else {
        return;
    };
    info!(
        "Game {game_id}: quiz '{}' loaded ({} questions)",
        quiz.title,
        quiz.questions.len()
    );
    game.state.quiz = Some(quiz);
    if !persist(&app_state.store, game).await {
        send_msg(tx, &ServerMessage::error("Failed to save game state"));
        return;
    }
    game.broadcast_game_state();
}

/// Kick off the game: a `game_starting` countdown, then the first question.
pub async fn start_game(app_state: &Arc<AppState>, game_id: &str, tx: &Tx) {
    {
        let mut games = app_state.games.lock().await;
        let Some(game) = games.get_mut(game_id) else {
            return;
        };
        if game.state.phase != Phase::Lobby {
            send_msg(tx, &ServerMessage::error("Game has already started"));
            return;
        }
        if game.state.quiz.is_none() {
            send_msg(tx, &ServerMessage::error("Load a quiz before starting"));
            return;
        }
        if game.state.connected_player_count() == 0 {
            send_msg(
                tx,
                &ServerMessage::error("At least one connected player is required"),
            );
            return;
        }
        info!("Game {game_id}: starting");
        game.broadcast(&ServerMessage::GameStarting);
    }

    let app_state = app_state.clone();
    let game_id = game_id.to_string();
    tokio::spawn(async move {
        sleep(GAME_START_DELAY).await;
        game_timer::start_question(&app_state, &game_id, 0, Some(Phase::Lobby)).await;
    });
}

/// Advance from the leaderboard to the next question, or to the podium when
/// the quiz is exhausted.
pub async fn next_question(app_state: &Arc<AppState>, game_id: &str, tx: &Tx) {
    let next = {
        let games = app_state.games.lock().await;
        let Some(game) = games.get(game_id) else {
            return;
        };
        if game.state.phase != Phase::Leaderboard {
            send_msg(
                tx,
                &ServerMessage::error("Next question is only available from the leaderboard"),
            );
            return;
        }
        let next = (game.state.current_question_index + 1) as usize;
        if next < game.state.total_questions() {
            Some(next)
        } else {
            None
        }
    };

    match next {
        Some(index) => {
            game_timer::start_question(app_state, game_id, index, Some(Phase::Leaderboard)).await;
        }
        None => game_timer::show_podium(app_state, game_id).await,
    }
}
