use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::task::AbortHandle;

use crate::model::quiz::{Question, Quiz};
use crate::model::server_message::{ServerMessage, send_msg};
use crate::server::Tx;

pub const MAX_PLAYERS: usize = 200;
pub const MAX_NICKNAME_CHARS: usize = 50;
const PLAYER_ID_CHARS: usize = 12;

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Case-insensitive nickname comparison, after trimming.
pub fn same_nickname(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}

// === Phases ===

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Lobby,
    Question,
    Leaderboard,
    Podium,
    Finished,
}

// === Players ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerAnswer {
    pub answer_indices: Vec<usize>,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub id: String,
    pub nickname: String,
    pub score: u32,
    /// question id -> the first (and only) accepted answer.
    #[serde(default)]
    pub answers: HashMap<String, PlayerAnswer>,
    pub connected: bool,
}

impl Player {
    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id.clone(),
            nickname: self.nickname.clone(),
            score: self.score,
            connected: self.connected,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerView {
    pub id: String,
    pub nickname: String,
    pub score: u32,
    pub connected: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub player_id: String,
    pub nickname: String,
    pub score: u32,
    pub rank: usize,
    pub last_answer_correct: bool,
}

// === Persisted game state ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub phase: Phase,
    pub game_pin: String,
    pub quiz: Option<Quiz>,
    /// Insertion order is meaningful: it is the leaderboard tie-break.
    pub players: Vec<Player>,
    /// -1 while in the lobby.
    pub current_question_index: i32,
    pub question_start_time: Option<u64>,
    pub host_connected: bool,
    pub timer_paused: bool,
    pub paused_at_seconds_left: Option<u32>,
    /// Set once the current question's scoring pass has run.
    #[serde(default)]
    pub question_scored: bool,
}

impl GameState {
    pub fn new() -> Self {
        GameState {
            phase: Phase::Lobby,
            game_pin: generate_pin(),
            quiz: None,
            players: Vec::new(),
            current_question_index: -1,
            question_start_time: None,
            host_connected: false,
            timer_paused: false,
            paused_at_seconds_left: None,
            question_scored: false,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        if self.current_question_index < 0 {
            return None;
        }
        self.quiz
            .as_ref()?
            .questions
            .get(self.current_question_index as usize)
    }

    pub fn total_questions(&self) -> usize {
        self.quiz.as_ref().map(|q| q.questions.len()).unwrap_or(0)
    }

    pub fn find_player(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    pub fn find_player_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    pub fn nickname_taken(&self, nickname: &str) -> bool {
        self.players
            .iter()
            .any(|p| same_nickname(&p.nickname, nickname))
    }

    pub fn connected_player_count(&self) -> usize {
        self.players.iter().filter(|p| p.connected).count()
    }

    /// Add a player with a freshly minted id. The nickname must already be
    /// trimmed and validated.
    pub fn add_player(&mut self, nickname: String) -> Player {
        let player = Player {
            id: mint_player_id(),
            nickname,
            score: 0,
            answers: HashMap::new(),
            connected: true,
        };
        self.players.push(player.clone());
        player
    }

    /// Convert to the wire format for host screens: the full quiz is
    /// included (the host authored it).
    pub fn to_host_view(&self) -> GameStateView {
        GameStateView {
            phase: self.phase,
            game_pin: self.game_pin.clone(),
            current_question_index: self.current_question_index,
            question_start_time: self.question_start_time,
            timer_paused: self.timer_paused,
            host_connected: self.host_connected,
            quiz: self.quiz.as_ref().map(|q| QuizInfo {
                title: q.title.clone(),
                question_count: q.questions.len(),
                questions: Some(q.questions.clone()),
            }),
            players: self.players.iter().map(Player::view).collect(),
            you: None,
        }
    }

    /// Convert to the filtered wire format for player screens. The player's
    /// own record rides along so a rejoining client can reconstruct what it
    /// already answered.
    pub fn to_player_view(&self, player_id: Option<&str>) -> GameStateView {
        GameStateView {
            phase: self.phase,
            game_pin: self.game_pin.clone(),
            current_question_index: self.current_question_index,
            question_start_time: self.question_start_time,
            timer_paused: self.timer_paused,
            host_connected: self.host_connected,
            quiz: self.quiz.as_ref().map(|q| QuizInfo {
                title: q.title.clone(),
                question_count: q.questions.len(),
                questions: None,
            }),
            players: self.players.iter().map(Player::view).collect(),
            you: player_id.and_then(|id| self.find_player(id)).cloned(),
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_pin() -> String {
    rand::rng().random_range(100_000..=999_999).to_string()
}

fn mint_player_id() -> String {
    rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(PLAYER_ID_CHARS)
        .map(|b| (b as char).to_ascii_lowercase())
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizInfo {
    pub title: String,
    pub question_count: usize,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub questions: Option<Vec<Question>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameStateView {
    pub phase: Phase,
    pub game_pin: String,
    pub current_question_index: i32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub question_start_time: Option<u64>,
    pub timer_paused: bool,
    pub host_connected: bool,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub quiz: Option<QuizInfo>,
    pub players: Vec<PlayerView>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub you: Option<Player>,
}

// === Live coordinator ===

/// A live socket admitted to the game. Exists only while the socket is open.
pub struct Session {
    pub tx: Tx,
    pub is_host: bool,
    pub player_id: Option<String>,
}

/// One game's live coordinator: the persisted state plus everything that
/// does not survive a restart (sessions, the ticker, the countdown value).
pub struct Game {
    pub game_id: String,
    pub state: GameState,
    pub sessions: HashMap<u64, Session>,
    pub current_seconds_left: u32,
    pub ticker_abort: Option<AbortHandle>,
    next_session_id: u64,
}

impl Game {
    pub fn new(game_id: String, state: GameState) -> Self {
        Game {
            game_id,
            state,
            sessions: HashMap::new(),
            current_seconds_left: 0,
            ticker_abort: None,
            next_session_id: 1,
        }
    }

    pub fn add_session(&mut self, tx: Tx, is_host: bool) -> u64 {
        let session_id = self.next_session_id;
        self.next_session_id += 1;
        self.sessions.insert(
            session_id,
            Session {
                tx,
                is_host,
                player_id: None,
            },
        );
        session_id
    }

    pub fn remove_session(&mut self, session_id: u64) -> Option<Session> {
        self.sessions.remove(&session_id)
    }

    pub fn session(&self, session_id: u64) -> Option<&Session> {
        self.sessions.get(&session_id)
    }

    pub fn session_mut(&mut self, session_id: u64) -> Option<&mut Session> {
        self.sessions.get_mut(&session_id)
    }

    pub fn has_host_session(&self) -> bool {
        self.sessions.values().any(|s| s.is_host)
    }

    pub fn player_has_session(&self, player_id: &str) -> bool {
        self.sessions
            .values()
            .any(|s| s.player_id.as_deref() == Some(player_id))
    }

    pub fn ticker_running(&self) -> bool {
        self.ticker_abort.is_some()
    }

    pub fn stop_ticker(&mut self) {
        if let Some(handle) = self.ticker_abort.take() {
            handle.abort();
        }
    }

    /// Seconds left on the current question according to the wall clock.
    /// Scoring never uses this; it only reconstructs the countdown.
    pub fn wall_clock_remaining(&self) -> u32 {
        let (Some(start), Some(question)) =
            (self.state.question_start_time, self.state.current_question())
        else {
            return 0;
        };
        let elapsed_secs = (now_ms().saturating_sub(start) / 1000) as u32;
        question.timer_seconds.saturating_sub(elapsed_secs)
    }

    /// Every currently-connected player has answered the current question,
    /// and at least one player is connected.
    pub fn all_connected_answered(&self) -> bool {
        let Some(question) = self.state.current_question() else {
            return false;
        };
        let mut any_connected = false;
        for player in self.state.players.iter().filter(|p| p.connected) {
            any_connected = true;
            if !player.answers.contains_key(&question.id) {
                return false;
            }
        }
        any_connected
    }

    pub fn send_to(&self, session_id: u64, msg: &ServerMessage) {
        if let Some(session) = self.sessions.get(&session_id) {
            send_msg(&session.tx, msg);
        }
    }

    pub fn broadcast(&self, msg: &ServerMessage) {
        for session in self.sessions.values() {
            send_msg(&session.tx, msg);
        }
    }

    /// Send each session its role-shaped view of the current state.
    pub fn broadcast_game_state(&self) {
        for session in self.sessions.values() {
            send_msg(
                &session.tx,
                &ServerMessage::GameState {
                    state: self.view_for(session),
                },
            );
        }
    }

    pub fn send_game_state_to(&self, session_id: u64) {
        if let Some(session) = self.sessions.get(&session_id) {
            send_msg(
                &session.tx,
                &ServerMessage::GameState {
                    state: self.view_for(session),
                },
            );
        }
    }

    fn view_for(&self, session: &Session) -> GameStateView {
        if session.is_host {
            self.state.to_host_view()
        } else {
            self.state.to_player_view(session.player_id.as_deref())
        }
    }

    fn question_start_message(&self, for_host: bool) -> Option<ServerMessage> {
        let question = self.state.current_question()?;
        Some(ServerMessage::QuestionStart {
            question: question.view(for_host),
            question_index: self.state.current_question_index as usize,
            total_questions: self.state.total_questions(),
        })
    }

    pub fn broadcast_question_start(&self) {
        for session in self.sessions.values() {
            if let Some(msg) = self.question_start_message(session.is_host) {
                send_msg(&session.tx, &msg);
            }
        }
    }

    pub fn send_question_start_to(&self, session_id: u64) {
        if let Some(session) = self.sessions.get(&session_id) {
            if let Some(msg) = self.question_start_message(session.is_host) {
                send_msg(&session.tx, &msg);
            }
        }
    }
}
