use crate::model::game::{GameState, LeaderboardEntry, PlayerAnswer};
use crate::model::quiz::Question;

pub const BASE_POINTS: u32 = 1000;

/// Exact-set match. Answers and correct indices are stored sorted and
/// deduplicated, so equal length plus containment is set equality.
pub fn answer_is_correct(question: &Question, answer: &PlayerAnswer) -> bool {
    answer.answer_indices.len() == question.correct_indices.len()
        && answer
            .answer_indices
            .iter()
            .all(|i| question.correct_indices.contains(i))
}

/// Points for a correct answer: half the pot is guaranteed, the other half
/// scales linearly with how much of the time window was left.
pub fn points_for_answer(question: &Question, answer: &PlayerAnswer, question_start: u64) -> u32 {
    let max_points = if question.double_points {
        BASE_POINTS * 2
    } else {
        BASE_POINTS
    };
    let time_window = f64::from(question.timer_seconds) * 1000.0;
    let response_time = answer.timestamp.saturating_sub(question_start) as f64;
    let time_bonus = (1.0 - response_time / time_window).max(0.0);
    (f64::from(max_points) * (0.5 + 0.5 * time_bonus)).round() as u32
}

/// Run the scoring pass for the current question. Each player is scored at
/// most once per question; calling this again is a no-op.
pub fn score_current_question(state: &mut GameState) {
    if state.question_scored {
        return;
    }
    let Some(start) = state.question_start_time else {
        return;
    };
    let Some(question) = state.current_question().cloned() else {
        return;
    };
    for player in &mut state.players {
        if let Some(answer) = player.answers.get(&question.id) {
            if answer_is_correct(&question, answer) {
                player.score += points_for_answer(&question, answer, start);
            }
        }
    }
    state.question_scored = true;
}

/// Derive the leaderboard: descending score, ties broken by player insertion
/// order (stable sort keyed on score only), ranks 1-based.
pub fn build_leaderboard(state: &GameState) -> Vec<LeaderboardEntry> {
    let current = state.current_question();
    let mut entries: Vec<LeaderboardEntry> = state
        .players
        .iter()
        .map(|player| {
            let last_answer_correct = match current {
                Some(q) => player
                    .answers
                    .get(&q.id)
                    .map(|answer| answer_is_correct(q, answer))
                    .unwrap_or(false),
                None => false,
            };
            LeaderboardEntry {
                player_id: player.id.clone(),
                nickname: player.nickname.clone(),
                score: player.score,
                rank: 0,
                last_answer_correct,
            }
        })
        .collect();
    entries.sort_by(|a, b| b.score.cmp(&a.score));
    for (i, entry) in entries.iter_mut().enumerate() {
        entry.rank = i + 1;
    }
    entries
}
