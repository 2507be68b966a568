use crate::{TestClient, TestServer, load_quiz, sample_quiz, unique_game_id};

use quizpin::model::client_message::ClientMessage;
use quizpin::model::game::MAX_PLAYERS;
use quizpin::model::server_message::ServerMessage;

#[tokio::test]
async fn player_joins_lobby_and_host_sees_roster_update() {
    let server = TestServer::start().await;
    let game_id = unique_game_id();
    let (mut host, _) = TestClient::connect_host(&server, &game_id).await;

    let mut player = TestClient::connect_player(&server, &game_id).await;
    let player_id = player.join("Alice").await;

    let update: ServerMessage = host.recv_json().await;
    match update {
        ServerMessage::PlayerJoined {
            player,
            player_count,
        } => {
            assert_eq!(player.id, player_id);
            assert_eq!(player.nickname, "Alice");
            assert_eq!(player_count, 1);
            assert!(player.connected);
        }
        other => panic!("Expected PlayerJoined, got {other:?}"),
    }
}

#[tokio::test]
async fn nickname_is_trimmed_before_storage() {
    let server = TestServer::start().await;
    let game_id = unique_game_id();
    let (_host, _) = TestClient::connect_host(&server, &game_id).await;

    let mut player = TestClient::connect_player(&server, &game_id).await;
    player
        .send_json(&ClientMessage::PlayerJoin {
            nickname: "  Alice  ".to_string(),
        })
        .await;

    let joined: ServerMessage = player.recv_json().await;
    match joined {
        ServerMessage::PlayerJoined { player, .. } => {
            assert_eq!(player.nickname, "Alice");
        }
        other => panic!("Expected PlayerJoined, got {other:?}"),
    }
}

#[tokio::test]
async fn duplicate_nicknames_rejected_case_insensitively() {
    let server = TestServer::start().await;
    let game_id = unique_game_id();
    let (_host, _) = TestClient::connect_host(&server, &game_id).await;

    let mut first = TestClient::connect_player(&server, &game_id).await;
    first.join("Alice").await;

    let mut second = TestClient::connect_player(&server, &game_id).await;
    second
        .send_json(&ClientMessage::PlayerJoin {
            nickname: "aLiCe".to_string(),
        })
        .await;
    let message = second.expect_error().await;
    assert!(
        message.contains("taken"),
        "Expected duplicate-nickname error, got: {message}"
    );
}

#[tokio::test]
async fn empty_and_oversized_nicknames_rejected() {
    let server = TestServer::start().await;
    let game_id = unique_game_id();
    let (_host, _) = TestClient::connect_host(&server, &game_id).await;

    let mut player = TestClient::connect_player(&server, &game_id).await;

    player
        .send_json(&ClientMessage::PlayerJoin {
            nickname: "   ".to_string(),
        })
        .await;
    let message = player.expect_error().await;
    assert!(message.contains("empty"), "got: {message}");

    player
        .send_json(&ClientMessage::PlayerJoin {
            nickname: "x".repeat(51),
        })
        .await;
    let message = player.expect_error().await;
    assert!(message.contains("50"), "got: {message}");

    // Exactly 50 characters is fine.
    player
        .send_json(&ClientMessage::PlayerJoin {
            nickname: "x".repeat(50),
        })
        .await;
    let response: ServerMessage = player.recv_json().await;
    assert!(
        matches!(response, ServerMessage::PlayerJoined { .. }),
        "Expected PlayerJoined, got {response:?}"
    );
}

#[tokio::test]
async fn joining_after_game_start_is_rejected() {
    let server = TestServer::start().await;
    let game_id = unique_game_id();
    let (mut host, _) = TestClient::connect_host(&server, &game_id).await;
    let mut player = TestClient::connect_player(&server, &game_id).await;
    player.join("Alice").await;
    let _: ServerMessage = host.recv_json().await; // player_joined

    load_quiz(&mut host, &sample_quiz(1, 20)).await;
    let _ = player.expect_game_state().await;

    host.send_json(&ClientMessage::HostStartGame).await;
    player
        .wait_for("question_start", |msg| {
            matches!(msg, ServerMessage::QuestionStart { .. })
        })
        .await;

    let mut late = TestClient::connect(&server.ws_url(&game_id, false)).await;
    late.send_json(&ClientMessage::PlayerJoin {
        nickname: "Bob".to_string(),
    })
    .await;
    let message = late
        .wait_for("join rejection", |msg| {
            matches!(msg, ServerMessage::Error { .. })
        })
        .await;
    match message {
        ServerMessage::Error { message } => {
            assert!(message.contains("started"), "got: {message}");
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn game_admits_exactly_the_player_cap() {
    let server = TestServer::start().await;
    let game_id = unique_game_id();

    for i in 0..MAX_PLAYERS {
        let mut player = TestClient::connect_player(&server, &game_id).await;
        player.join(&format!("player-{i}")).await;
    }

    let mut overflow = TestClient::connect_player(&server, &game_id).await;
    overflow
        .send_json(&ClientMessage::PlayerJoin {
            nickname: "one-too-many".to_string(),
        })
        .await;
    let message = overflow.expect_error().await;
    assert!(message.contains("full"), "got: {message}");
}

#[tokio::test]
async fn second_host_socket_is_rejected() {
    let server = TestServer::start().await;
    let game_id = unique_game_id();
    let (_host, _) = TestClient::connect_host(&server, &game_id).await;

    let mut second = TestClient::connect(&server.ws_url(&game_id, true)).await;
    let message = second.expect_error().await;
    assert!(
        message.contains("active host"),
        "Expected duplicate-host error, got: {message}"
    );
}

#[tokio::test]
async fn host_cannot_join_as_player() {
    let server = TestServer::start().await;
    let game_id = unique_game_id();
    let (mut host, _) = TestClient::connect_host(&server, &game_id).await;

    host.send_json(&ClientMessage::PlayerJoin {
        nickname: "Sneaky".to_string(),
    })
    .await;
    let message = host.expect_error().await;
    assert!(
        message.contains("player"),
        "Expected role error, got: {message}"
    );
}
