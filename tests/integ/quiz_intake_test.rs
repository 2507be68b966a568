use crate::{TestClient, TestServer, load_quiz, sample_quiz, unique_game_id};

use quizpin::model::client_message::ClientMessage;
use quizpin::model::server_message::ServerMessage;

#[tokio::test]
async fn host_loads_quiz_and_everyone_sees_it() {
    let server = TestServer::start().await;
    let game_id = unique_game_id();
    let (mut host, _) = TestClient::connect_host(&server, &game_id).await;
    let mut player = TestClient::connect_player(&server, &game_id).await;
    player.join("Alice").await;
    let _: ServerMessage = host.recv_json().await; // consume player_joined

    host.send_json(&ClientMessage::HostCreateQuiz {
        quiz: sample_quiz(3, 20),
    })
    .await;

    let host_state = host.expect_game_state().await;
    let quiz = host_state.quiz.expect("Host should see the quiz");
    assert_eq!(quiz.question_count, 3);
    assert!(
        quiz.questions.is_some(),
        "Host view should carry the full question list"
    );

    let player_state = player.expect_game_state().await;
    let quiz = player_state.quiz.expect("Player should see quiz metadata");
    assert_eq!(quiz.question_count, 3);
    assert!(
        quiz.questions.is_none(),
        "Players must not receive question contents"
    );
}

#[tokio::test]
async fn structurally_invalid_quizzes_are_rejected() {
    let server = TestServer::start().await;
    let game_id = unique_game_id();
    let (mut host, _) = TestClient::connect_host(&server, &game_id).await;

    let mut empty_title = sample_quiz(1, 10);
    empty_title.title = "   ".to_string();

    let mut no_questions = sample_quiz(1, 10);
    no_questions.questions.clear();

    let mut three_answers = sample_quiz(1, 10);
    three_answers.questions[0].answers.pop();

    let mut no_correct = sample_quiz(1, 10);
    no_correct.questions[0].correct_indices.clear();

    let mut out_of_range = sample_quiz(1, 10);
    out_of_range.questions[0].correct_indices = vec![0, 4];

    let mut bad_timer = sample_quiz(1, 10);
    bad_timer.questions[0].timer_seconds = 15;

    for quiz in [
        empty_title,
        no_questions,
        three_answers,
        no_correct,
        out_of_range,
        bad_timer,
    ] {
        host.send_json(&ClientMessage::HostCreateQuiz { quiz }).await;
        let message = host.expect_error().await;
        assert!(!message.is_empty(), "Validation errors carry a reason");
    }

    // None of the rejects took effect: starting still complains about the
    // missing quiz.
    host.send_json(&ClientMessage::HostStartGame).await;
    let message = host.expect_error().await;
    assert!(
        message.contains("quiz"),
        "Expected missing-quiz error, got: {message}"
    );
}

#[tokio::test]
async fn player_cannot_load_a_quiz() {
    let server = TestServer::start().await;
    let game_id = unique_game_id();
    let (_host, _) = TestClient::connect_host(&server, &game_id).await;
    let mut player = TestClient::connect_player(&server, &game_id).await;

    player
        .send_json(&ClientMessage::HostCreateQuiz {
            quiz: sample_quiz(1, 10),
        })
        .await;

    let message = player.expect_error().await;
    assert!(
        message.contains("host"),
        "Expected role error, got: {message}"
    );
}

#[tokio::test]
async fn malformed_json_returns_error_without_closing() {
    let server = TestServer::start().await;
    let game_id = unique_game_id();
    let (mut host, _) = TestClient::connect_host(&server, &game_id).await;

    host.send_raw_text("{this is not valid json}").await;
    let message = host.expect_error().await;
    assert!(
        message.contains("Invalid"),
        "Expected parse error, got: {message}"
    );

    // The socket still works afterwards.
    load_quiz(&mut host, &sample_quiz(1, 10)).await;
}

#[tokio::test]
async fn unknown_message_type_returns_error() {
    let server = TestServer::start().await;
    let game_id = unique_game_id();
    let (mut host, _) = TestClient::connect_host(&server, &game_id).await;

    host.send_raw_text(r#"{"type":"host_time_travel"}"#).await;
    let message = host.expect_error().await;
    assert!(!message.is_empty());
}
