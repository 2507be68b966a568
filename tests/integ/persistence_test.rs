use crate::{TestClient, TestServer, load_quiz, sample_quiz, unique_game_id};

use quizpin::model::client_message::ClientMessage;
use quizpin::model::game::{GameState, Phase, PlayerAnswer, now_ms};
use quizpin::model::server_message::ServerMessage;
use quizpin::persistence::SnapshotStore;

#[tokio::test]
async fn restart_restores_roster_pin_and_quiz() {
    let dir = tempfile::tempdir().unwrap();
    let game_id = unique_game_id();

    let pin = {
        let server = TestServer::start_with_data_dir(dir.path()).await;
        let (mut host, pin) = TestClient::connect_host(&server, &game_id).await;
        let mut alice = TestClient::connect_player(&server, &game_id).await;
        alice.join("Alice").await;
        let _: ServerMessage = host.recv_json().await;
        load_quiz(&mut host, &sample_quiz(2, 20)).await;
        pin
    };

    // A new process with the same data directory picks the game back up.
    let server = TestServer::start_with_data_dir(dir.path()).await;
    let (_host, restored_pin) = TestClient::connect_host(&server, &game_id).await;
    assert_eq!(restored_pin, pin, "The PIN is assigned once and survives");

    let mut player = TestClient::connect_player(&server, &game_id).await;
    let state = {
        player
            .send_json(&ClientMessage::PlayerRejoin {
                player_id: "does-not-matter".to_string(),
                nickname: "Bob".to_string(),
            })
            .await;
        player
            .wait_for("player_joined", |msg| {
                matches!(msg, ServerMessage::PlayerJoined { .. })
            })
            .await;
        player.expect_game_state().await
    };
    assert_eq!(state.phase, Phase::Lobby);
    let quiz = state.quiz.expect("Quiz survives the restart");
    assert_eq!(quiz.question_count, 2);
    let alice = state
        .players
        .iter()
        .find(|p| p.nickname == "Alice")
        .expect("Roster survives the restart");
    assert!(
        !alice.connected,
        "Sockets do not survive a restart, so players load disconnected"
    );
}

#[tokio::test]
async fn restart_mid_question_rebuilds_the_countdown() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::at(dir.path().to_path_buf());
    let game_id = unique_game_id();

    // Snapshot of a question that started three seconds ago.
    let mut state = GameState::new();
    state.quiz = Some(sample_quiz(1, 20));
    state.phase = Phase::Question;
    state.current_question_index = 0;
    state.question_start_time = Some(now_ms() - 3_000);
    state.add_player("Alice".to_string());
    store.save(&game_id, &state).await.unwrap();

    let server = TestServer::start_with_data_dir(dir.path()).await;
    let mut client = TestClient::connect(&server.ws_url(&game_id, false)).await;

    let loaded = client.expect_game_state().await;
    assert_eq!(loaded.phase, Phase::Question);

    let start = client.recv_json::<ServerMessage>().await;
    assert!(
        matches!(start, ServerMessage::QuestionStart { .. }),
        "Expected QuestionStart, got {start:?}"
    );
    let tick = client.recv_json::<ServerMessage>().await;
    match tick {
        ServerMessage::TimerTick { seconds_left } => {
            assert!(
                (15..=17).contains(&seconds_left),
                "Expected roughly 17 seconds left, got {seconds_left}"
            );
        }
        other => panic!("Expected TimerTick, got {other:?}"),
    }

    // The rebuilt ticker keeps counting down.
    let next_tick = client
        .wait_for("a further tick", |msg| {
            matches!(msg, ServerMessage::TimerTick { .. })
        })
        .await;
    match next_tick {
        ServerMessage::TimerTick { seconds_left } => {
            assert!(seconds_left < 17, "got {seconds_left}");
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn restart_past_the_deadline_scores_and_shows_the_leaderboard() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::at(dir.path().to_path_buf());
    let game_id = unique_game_id();

    // The question expired while the process was down. Alice answered
    // correctly two seconds in: round(1000 * (0.5 + 0.5 * 0.8)) = 900.
    let started = now_ms() - 60_000;
    let mut state = GameState::new();
    state.quiz = Some(sample_quiz(1, 10));
    state.phase = Phase::Question;
    state.current_question_index = 0;
    state.question_start_time = Some(started);
    let alice = state.add_player("Alice".to_string());
    state.find_player_mut(&alice.id).unwrap().answers.insert(
        "q1".to_string(),
        PlayerAnswer {
            answer_indices: vec![0],
            timestamp: started + 2_000,
        },
    );
    store.save(&game_id, &state).await.unwrap();

    let server = TestServer::start_with_data_dir(dir.path()).await;
    let (mut host, _) = TestClient::connect_host(&server, &game_id).await;

    // The loaded game has already been closed out.
    let update = host
        .wait_for("leaderboard_update", |msg| {
            matches!(msg, ServerMessage::LeaderboardUpdate { .. })
        })
        .await;
    match update {
        ServerMessage::LeaderboardUpdate { leaderboard } => {
            assert_eq!(leaderboard.len(), 1);
            assert_eq!(leaderboard[0].score, 900);
            assert_eq!(leaderboard[0].rank, 1);
            assert!(leaderboard[0].last_answer_correct);
        }
        _ => unreachable!(),
    }

    // Scoring ran exactly once even though the snapshot is re-read.
    let state: serde_json::Value = reqwest::get(server.http_url(&format!("/games/{game_id}/state")))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(state["phase"], "leaderboard");
}

#[tokio::test]
async fn snapshot_written_after_scoring_is_stable_across_two_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let store = SnapshotStore::at(dir.path().to_path_buf());
    let game_id = unique_game_id();

    let started = now_ms() - 60_000;
    let mut state = GameState::new();
    state.quiz = Some(sample_quiz(1, 10));
    state.phase = Phase::Question;
    state.current_question_index = 0;
    state.question_start_time = Some(started);
    let alice = state.add_player("Alice".to_string());
    state.find_player_mut(&alice.id).unwrap().answers.insert(
        "q1".to_string(),
        PlayerAnswer {
            answer_indices: vec![0],
            timestamp: started + 2_000,
        },
    );
    store.save(&game_id, &state).await.unwrap();

    // First restart scores and persists the recovered state.
    {
        let server = TestServer::start_with_data_dir(dir.path()).await;
        let (_host, _) = TestClient::connect_host(&server, &game_id).await;
    }

    // Second restart must not score again.
    let server = TestServer::start_with_data_dir(dir.path()).await;
    let (mut host, _) = TestClient::connect_host(&server, &game_id).await;
    let update = host
        .wait_for("leaderboard_update", |msg| {
            matches!(msg, ServerMessage::LeaderboardUpdate { .. })
        })
        .await;
    match update {
        ServerMessage::LeaderboardUpdate { leaderboard } => {
            assert_eq!(leaderboard[0].score, 900, "No double scoring across restarts");
        }
        _ => unreachable!(),
    }
}
