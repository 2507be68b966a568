use std::sync::Arc;
use std::time::Duration;

use log::{error, info};
use tokio::time::sleep;

use crate::model::game::{Game, Phase, now_ms};
use crate::model::server_message::ServerMessage;
use crate::scoring;
use crate::server::{AppState, persist};

/// Delay between a question ending and the next screen appearing.
pub const QUESTION_END_DELAY: Duration = Duration::from_secs(3);
/// Delay between `game_starting` and the first question.
pub const GAME_START_DELAY: Duration = Duration::from_secs(3);

/// Spawn the once-per-second countdown task for `game`. The task decrements
/// the in-memory countdown under the games lock; the caller must have set
/// `current_seconds_left` first. Any previously running ticker is cancelled,
/// keeping at most one per game.
pub fn start_ticker(game: &mut Game, app_state: &Arc<AppState>) {
    game.stop_ticker();

    let app_state = app_state.clone();
    let game_id = game.game_id.clone();

    let task = tokio::spawn(async move {
        loop {
            sleep(Duration::from_secs(1)).await;

            let expired = {
                let mut games = app_state.games.lock().await;
                let Some(game) = games.get_mut(&game_id) else {
                    error!("Tried to tick game timer, but game {game_id} no longer exists");
                    break;
                };
                if game.state.phase != Phase::Question || game.state.timer_paused {
                    break;
                }
                if game.current_seconds_left == 0 {
                    break;
                }
                game.current_seconds_left -= 1;
                if game.current_seconds_left > 0 {
                    game.broadcast(&ServerMessage::TimerTick {
                        seconds_left: game.current_seconds_left,
                    });
                    false
                } else {
                    // This task is the one running end_question below, so it
                    // must not hold an abort handle on itself.
                    game.ticker_abort = None;
                    true
                }
            };

            if expired {
                end_question(&app_state, &game_id).await;
                break;
            }
        }
    });

    game.ticker_abort = Some(task.abort_handle());
}

/// Stop the ticker and remember where the countdown stood. The caller
/// persists and broadcasts `game_paused`.
pub fn pause_timer(game: &mut Game) {
    game.stop_ticker();
    game.state.timer_paused = true;
    game.state.paused_at_seconds_left = Some(game.current_seconds_left);
}

/// Move the game onto question `index`. `expected_phase` guards delayed
/// invocations: by the time a scheduled start fires, the host may already
/// have moved the game elsewhere.
pub async fn start_question(
    app_state: &Arc<AppState>,
    game_id: &str,
    index: usize,
    expected_phase: Option<Phase>,
) {
    let mut games = app_state.games.lock().await;
    let Some(game) = games.get_mut(game_id) else {
        return;
    };
    if let Some(phase) = expected_phase {
        if game.state.phase != phase {
            return;
        }
    }
    let Some(timer_seconds) = game
        .state
        .quiz
        .as_ref()
        .and_then(|q| q.questions.get(index))
        .map(|q| q.timer_seconds)
    else {
        error!("Game {game_id} has no question at index {index}");
        return;
    };

    game.stop_ticker();
    game.state.phase = Phase::Question;
    game.state.current_question_index = index as i32;
    game.state.question_start_time = Some(now_ms());
    game.state.question_scored = false;
    game.state.timer_paused = false;
    game.state.paused_at_seconds_left = None;
    persist(&app_state.store, game).await;

    info!("Game {game_id}: question {} started", index + 1);
    game.broadcast_question_start();
    game.current_seconds_left = timer_seconds;
    start_ticker(game, app_state);
}

/// Close out the current question: stop the ticker, score, persist,
/// broadcast the reveal, and schedule the next screen. Idempotent: once the
/// question has been scored, further calls return immediately.
pub async fn end_question(app_state: &Arc<AppState>, game_id: &str) {
    let is_last = {
        let mut games = app_state.games.lock().await;
        let Some(game) = games.get_mut(game_id) else {
            return;
        };
        if game.state.phase != Phase::Question || game.state.question_scored {
            return;
        }
        game.stop_ticker();
        game.state.timer_paused = false;
        game.state.paused_at_seconds_left = None;
        scoring::score_current_question(&mut game.state);
        persist(&app_state.store, game).await;

        let correct_indices = game
            .state
            .current_question()
            .map(|q| q.correct_indices.clone())
            .unwrap_or_default();
        let scores = scoring::build_leaderboard(&game.state);
        game.broadcast(&ServerMessage::QuestionEnd {
            correct_indices,
            scores,
        });
        info!("Game {game_id}: question {} ended", game.state.current_question_index + 1);
        (game.state.current_question_index + 1) as usize >= game.state.total_questions()
    };

    let app_state = app_state.clone();
    let game_id = game_id.to_string();
    tokio::spawn(async move {
        sleep(QUESTION_END_DELAY).await;
        let still_on_question = {
            let games = app_state.games.lock().await;
            games
                .get(&game_id)
                .map(|g| g.state.phase == Phase::Question)
                .unwrap_or(false)
        };
        if !still_on_question {
            return;
        }
        if is_last {
            show_podium(&app_state, &game_id).await;
        } else {
            show_leaderboard(&app_state, &game_id).await;
        }
    });
}

pub async fn show_leaderboard(app_state: &Arc<AppState>, game_id: &str) {
    let mut games = app_state.games.lock().await;
    let Some(game) = games.get_mut(game_id) else {
        return;
    };
    game.stop_ticker();
    game.state.timer_paused = false;
    game.state.paused_at_seconds_left = None;
    game.state.phase = Phase::Leaderboard;
    persist(&app_state.store, game).await;
    let leaderboard = scoring::build_leaderboard(&game.state);
    game.broadcast(&ServerMessage::LeaderboardUpdate { leaderboard });
}

/// Enter the podium phase and run the staggered reveal: third place after
/// 1 s, second after 3 s, first after 5 s, at which point the game finishes.
pub async fn show_podium(app_state: &Arc<AppState>, game_id: &str) {
    {
        let mut games = app_state.games.lock().await;
        let Some(game) = games.get_mut(game_id) else {
            return;
        };
        game.stop_ticker();
        game.state.timer_paused = false;
        game.state.paused_at_seconds_left = None;
        game.state.phase = Phase::Podium;
        persist(&app_state.store, game).await;
        info!("Game {game_id}: podium");
    }

    let app_state = app_state.clone();
    let game_id = game_id.to_string();
    tokio::spawn(async move {
        for (delay_secs, position) in [(1u64, 3usize), (2, 2), (2, 1)] {
            sleep(Duration::from_secs(delay_secs)).await;
            let mut games = app_state.games.lock().await;
            let Some(game) = games.get_mut(&game_id) else {
                return;
            };
            // The host may have moved on; reveals only make sense while the
            // podium (or the finished screen it leads to) is showing.
            if game.state.phase != Phase::Podium && game.state.phase != Phase::Finished {
                return;
            }
            let leaderboard = scoring::build_leaderboard(&game.state);
            game.broadcast(&ServerMessage::PodiumReveal {
                position,
                player: leaderboard.get(position - 1).cloned(),
            });
            if position == 1 {
                game.state.phase = Phase::Finished;
                persist(&app_state.store, game).await;
                game.broadcast(&ServerMessage::GameFinished {
                    final_leaderboard: leaderboard,
                });
                info!("Game {game_id}: finished");
            }
        }
    });
}
