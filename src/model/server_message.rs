use log::{debug, error};
use serde::{Deserialize, Serialize};
use tokio_tungstenite::tungstenite::Message;

use crate::model::game::{GameStateView, LeaderboardEntry, PlayerView};
use crate::model::quiz::QuestionView;
use crate::server::Tx;

/// Outbound messages, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Error {
        message: String,
    },
    GameState {
        state: GameStateView,
    },
    #[serde(rename_all = "camelCase")]
    PlayerJoined {
        player: PlayerView,
        player_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    PlayerRejoined {
        player: PlayerView,
        player_count: usize,
    },
    #[serde(rename_all = "camelCase")]
    PlayerLeft {
        player_id: String,
        player_count: usize,
    },
    GameStarting,
    #[serde(rename_all = "camelCase")]
    QuestionStart {
        question: QuestionView,
        question_index: usize,
        total_questions: usize,
    },
    #[serde(rename_all = "camelCase")]
    TimerTick {
        seconds_left: u32,
    },
    #[serde(rename_all = "camelCase")]
    AnswerReceived {
        player_id: String,
    },
    #[serde(rename_all = "camelCase")]
    QuestionEnd {
        correct_indices: Vec<usize>,
        scores: Vec<LeaderboardEntry>,
    },
    LeaderboardUpdate {
        leaderboard: Vec<LeaderboardEntry>,
    },
    PodiumReveal {
        position: usize,
        player: Option<LeaderboardEntry>,
    },
    #[serde(rename_all = "camelCase")]
    GameFinished {
        final_leaderboard: Vec<LeaderboardEntry>,
    },
    GamePaused {
        reason: String,
    },
    GameResumed,
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }
}

/// Best-effort send to one session. Channel errors mean the socket is on its
/// way out; the close event is the authoritative signal.
pub fn send_msg(tx: &Tx, msg: &ServerMessage) {
    let text = match serde_json::to_string(msg) {
        Ok(text) => text,
        Err(e) => {
            error!("Failed to serialize server message: {e}");
            return;
        }
    };
    debug!("Sending server message: {text}");
    let _ = tx.send(Message::text(text));
}
