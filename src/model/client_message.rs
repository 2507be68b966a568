use serde::{Deserialize, Serialize};

use crate::model::quiz::Quiz;

/// Inbound messages, discriminated by `type`. Host and player commands share
/// one tagged union; the dispatcher checks the socket role before handling.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    HostCreateQuiz {
        quiz: Quiz,
    },
    HostStartGame,
    HostNextQuestion,
    HostShowLeaderboard,
    HostShowPodium,
    PlayerJoin {
        nickname: String,
    },
    #[serde(rename_all = "camelCase")]
    PlayerRejoin {
        player_id: String,
        nickname: String,
    },
    #[serde(rename_all = "camelCase")]
    PlayerAnswer {
        question_id: String,
        answer_indices: Vec<usize>,
    },
}

impl ClientMessage {
    pub fn requires_host(&self) -> bool {
        matches!(
            self,
            ClientMessage::HostCreateQuiz { .. }
                | ClientMessage::HostStartGame
                | ClientMessage::HostNextQuestion
                | ClientMessage::HostShowLeaderboard
                | ClientMessage::HostShowPodium
        )
    }
}
