//! Integration tests for the pong server.
//!
//! These tests start a real server instance and connect via WebSocket
//! to verify end-to-end behavior.

use futures_util::{SinkExt, StreamExt};
use pong_server::config::ServerConfig;
use pong_server::game_loop::{run_lobby, LobbyCommand};
use pong_server::ws::{router, AppState};
use pong_shared::config::GameConfig;
use pong_shared::protocol::{ClientMsg, ConnId, Direction, GameSnapshot, ServerMsg, Side};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

type Ws =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Start a test server on a random available port and return the WebSocket URL.
async fn start_test_server() -> String {
    start_test_server_with(|_| {}).await
}

/// Like `start_test_server`, with `tune` applied to the config first.
async fn start_test_server_with(tune: impl FnOnce(&mut ServerConfig)) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = ServerConfig {
        listen_addr: addr.to_string(),
        rng_seed: Some(12345),
        ..Default::default()
    };
    tune(&mut config);

    let (lobby_tx, lobby_rx) = mpsc::channel::<LobbyCommand>(config.command_buffer);
    let app_state = AppState {
        lobby_tx,
        outbound_buffer: config.outbound_buffer,
        game: config.game,
    };

    tokio::spawn(async move {
        run_lobby(lobby_rx, config, CancellationToken::new()).await;
    });

    let app = router(app_state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("ws://{}/ws", addr)
}

async fn connect(url: &str) -> Ws {
    let (ws, _) = connect_async(url).await.expect("Failed to connect");
    ws
}

/// Connect and consume the welcome message, returning our connection id.
async fn connect_player(url: &str) -> (Ws, ConnId) {
    let mut ws = connect(url).await;
    match recv_msg(&mut ws).await {
        ServerMsg::Welcome(welcome) => (ws, welcome.self_id),
        other => panic!("Expected Welcome, got {:?}", other),
    }
}

async fn send_msg(ws: &mut Ws, msg: ClientMsg) {
    let json = msg.to_json().unwrap();
    ws.send(Message::Text(json.into())).await.unwrap();
}

/// Read the next text message and parse as ServerMsg.
async fn recv_msg(ws: &mut Ws) -> ServerMsg {
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                return ServerMsg::from_json(text.as_str()).expect("Failed to parse server message");
            }
            Some(Ok(_)) => continue, // Skip ping/pong
            Some(Err(e)) => panic!("WebSocket error: {}", e),
            None => panic!("WebSocket closed unexpectedly"),
        }
    }
}

/// Read the next text message with a timeout.
async fn recv_msg_timeout(ws: &mut Ws, timeout: Duration) -> Option<ServerMsg> {
    tokio::time::timeout(timeout, recv_msg(ws)).await.ok()
}

/// Skip game updates until a message that is not one arrives.
async fn recv_event(ws: &mut Ws, timeout: Duration) -> Option<ServerMsg> {
    tokio::time::timeout(timeout, async {
        loop {
            match recv_msg(ws).await {
                ServerMsg::GameUpdate(_) => continue,
                other => return other,
            }
        }
    })
    .await
    .ok()
}

/// Join two fresh players into a match. The first is on the left.
async fn start_match(url: &str) -> (Ws, ConnId, Ws, ConnId, String) {
    let (mut ws1, id1) = connect_player(url).await;
    let (mut ws2, id2) = connect_player(url).await;

    send_msg(&mut ws1, ClientMsg::JoinRoom).await;
    assert!(matches!(recv_msg(&mut ws1).await, ServerMsg::Waiting));
    send_msg(&mut ws2, ClientMsg::JoinRoom).await;

    let room1 = expect_game_start(&mut ws1).await;
    let room2 = expect_game_start(&mut ws2).await;
    assert_eq!(room1, room2);
    (ws1, id1, ws2, id2, room1)
}

async fn expect_game_start(ws: &mut Ws) -> String {
    match recv_msg(ws).await {
        ServerMsg::GameStart(start) => {
            assert_eq!(start.game_state.room_id, start.room_id);
            assert!(start.game_state.game_started);
            assert!(!start.game_state.game_ended);
            start.room_id
        }
        other => panic!("Expected GameStart, got {:?}", other),
    }
}

fn paddle_y(snapshot: &GameSnapshot, id: ConnId) -> f64 {
    snapshot.players[&id].paddle.y
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_connect_and_receive_welcome() {
    let url = start_test_server().await;
    let mut ws = connect(&url).await;

    match recv_msg(&mut ws).await {
        ServerMsg::Welcome(welcome) => {
            assert_eq!(welcome.protocol_version, 1);
            assert!(welcome.self_id > 0, "self_id should be positive");
            assert_eq!(welcome.config, GameConfig::default());
        }
        other => panic!("Expected Welcome, got {:?}", other),
    }
}

#[tokio::test]
async fn test_multiple_clients_get_unique_ids() {
    let url = start_test_server().await;
    let (_ws1, id1) = connect_player(&url).await;
    let (_ws2, id2) = connect_player(&url).await;
    assert_ne!(id1, id2, "Each client should get a unique ID");
}

#[tokio::test]
async fn test_two_players_are_paired() {
    let url = start_test_server().await;
    let (mut ws1, id1) = connect_player(&url).await;
    let (mut ws2, id2) = connect_player(&url).await;

    send_msg(&mut ws1, ClientMsg::JoinRoom).await;
    assert!(matches!(recv_msg(&mut ws1).await, ServerMsg::Waiting));

    send_msg(&mut ws2, ClientMsg::JoinRoom).await;
    let start = match recv_msg(&mut ws1).await {
        ServerMsg::GameStart(start) => start,
        other => panic!("Expected GameStart, got {:?}", other),
    };
    let room2 = expect_game_start(&mut ws2).await;

    assert_eq!(start.room_id, room2);
    let state = &start.game_state;
    assert_eq!(state.players.len(), 2);
    assert_eq!(state.players[&id1].side, Side::Left);
    assert_eq!(state.players[&id2].side, Side::Right);
    assert_eq!(state.players[&id1].score, 0);
    assert_eq!((state.ball.x, state.ball.y), (400.0, 200.0));
}

#[tokio::test]
async fn test_third_player_waits_in_fifo_order() {
    let url = start_test_server().await;
    let (mut ws_a, _) = connect_player(&url).await;
    let (mut ws_b, _) = connect_player(&url).await;
    let (mut ws_c, _) = connect_player(&url).await;

    send_msg(&mut ws_a, ClientMsg::JoinRoom).await;
    assert!(matches!(recv_msg(&mut ws_a).await, ServerMsg::Waiting));
    send_msg(&mut ws_b, ClientMsg::JoinRoom).await;
    let room_a = expect_game_start(&mut ws_a).await;
    let room_b = expect_game_start(&mut ws_b).await;
    assert_eq!(room_a, room_b);

    send_msg(&mut ws_c, ClientMsg::JoinRoom).await;
    assert!(matches!(recv_msg(&mut ws_c).await, ServerMsg::Waiting));
}

#[tokio::test]
async fn test_game_updates_flow_after_start() {
    let url = start_test_server().await;
    let (mut ws1, _, _ws2, _, room) = start_match(&url).await;

    // ~60 Hz ticks: several updates within 200ms
    let mut updates = 0;
    let mut last_x = None;
    while updates < 5 {
        match recv_msg_timeout(&mut ws1, Duration::from_millis(500)).await {
            Some(ServerMsg::GameUpdate(snapshot)) => {
                assert_eq!(snapshot.room_id, room);
                last_x = Some(snapshot.ball.x);
                updates += 1;
            }
            other => panic!("Expected GameUpdate, got {:?}", other),
        }
    }
    // Kick-off moves right at 3 units per tick.
    assert!(last_x.unwrap() > 400.0);
}

#[tokio::test]
async fn test_paddle_moves_up_and_clamps_at_top() {
    let url = start_test_server().await;
    let (mut ws1, id1, _ws2, _, _) = start_match(&url).await;

    // 160 / 5 = 32 moves reach the top; send more than that.
    for _ in 0..40 {
        send_msg(
            &mut ws1,
            ClientMsg::PaddleMove {
                direction: Direction::Up,
            },
        )
        .await;
    }

    let mut last_y = 160.0;
    let mut reached_top = false;
    for _ in 0..500 {
        match recv_msg_timeout(&mut ws1, Duration::from_millis(500)).await {
            Some(ServerMsg::GameUpdate(snapshot)) => {
                let y = paddle_y(&snapshot, id1);
                assert!(y <= last_y, "paddle moved down: {} -> {}", last_y, y);
                assert!(y >= 0.0, "paddle above the field: {}", y);
                last_y = y;
                if y == 0.0 {
                    reached_top = true;
                    break;
                }
            }
            other => panic!("Expected GameUpdate, got {:?}", other),
        }
    }
    assert!(reached_top, "paddle should clamp at 0, last y {}", last_y);

    // Further presses keep it pinned.
    for _ in 0..5 {
        send_msg(
            &mut ws1,
            ClientMsg::PaddleMove {
                direction: Direction::Up,
            },
        )
        .await;
    }
    for _ in 0..20 {
        if let Some(ServerMsg::GameUpdate(snapshot)) =
            recv_msg_timeout(&mut ws1, Duration::from_millis(500)).await
        {
            assert_eq!(paddle_y(&snapshot, id1), 0.0);
        }
    }
}

#[tokio::test]
async fn test_opponent_sees_paddle_move() {
    let url = start_test_server().await;
    let (_ws1, _, mut ws2, id2, _) = start_match(&url).await;

    send_msg(
        &mut ws2,
        ClientMsg::PaddleMove {
            direction: Direction::Down,
        },
    )
    .await;

    let mut moved = false;
    for _ in 0..100 {
        if let Some(ServerMsg::GameUpdate(snapshot)) =
            recv_msg_timeout(&mut ws2, Duration::from_millis(500)).await
        {
            if paddle_y(&snapshot, id2) == 165.0 {
                moved = true;
                break;
            }
        }
    }
    assert!(moved, "right paddle should move down by one step");
}

#[tokio::test]
async fn test_disconnect_in_match_notifies_opponent_once() {
    let url = start_test_server().await;
    let (mut ws1, _, mut ws2, _, _) = start_match(&url).await;

    ws2.close(None).await.unwrap();

    match recv_event(&mut ws1, Duration::from_secs(2)).await {
        Some(ServerMsg::PlayerDisconnected) => {}
        other => panic!("Expected PlayerDisconnected, got {:?}", other),
    }

    // Nothing follows: no second notice, no further updates.
    let after = recv_msg_timeout(&mut ws1, Duration::from_millis(300)).await;
    assert!(after.is_none(), "Unexpected message after disconnect: {:?}", after);

    // The match is gone from the registry; the survivor can queue again.
    send_msg(&mut ws1, ClientMsg::JoinRoom).await;
    assert!(matches!(recv_msg(&mut ws1).await, ServerMsg::Waiting));
}

#[tokio::test]
async fn test_disconnect_while_queued_leaves_queue() {
    let url = start_test_server().await;
    let (mut ws_a, _) = connect_player(&url).await;
    send_msg(&mut ws_a, ClientMsg::JoinRoom).await;
    assert!(matches!(recv_msg(&mut ws_a).await, ServerMsg::Waiting));
    ws_a.close(None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let (mut ws_b, _) = connect_player(&url).await;
    send_msg(&mut ws_b, ClientMsg::JoinRoom).await;
    assert!(matches!(recv_msg(&mut ws_b).await, ServerMsg::Waiting));

    let (mut ws_c, _) = connect_player(&url).await;
    send_msg(&mut ws_c, ClientMsg::JoinRoom).await;
    let room_b = expect_game_start(&mut ws_b).await;
    let room_c = expect_game_start(&mut ws_c).await;
    assert_eq!(room_b, room_c);
}

#[tokio::test]
async fn test_move_without_match_is_ignored() {
    let url = start_test_server().await;
    let (mut ws, _) = connect_player(&url).await;

    send_msg(
        &mut ws,
        ClientMsg::PaddleMove {
            direction: Direction::Up,
        },
    )
    .await;
    assert!(recv_msg_timeout(&mut ws, Duration::from_millis(200))
        .await
        .is_none());
}

#[tokio::test]
async fn test_repeated_join_is_ignored() {
    let url = start_test_server().await;
    let (mut ws, _) = connect_player(&url).await;

    send_msg(&mut ws, ClientMsg::JoinRoom).await;
    assert!(matches!(recv_msg(&mut ws).await, ServerMsg::Waiting));
    send_msg(&mut ws, ClientMsg::JoinRoom).await;
    assert!(recv_msg_timeout(&mut ws, Duration::from_millis(200))
        .await
        .is_none());
}

#[tokio::test]
async fn test_malformed_messages_are_dropped() {
    let url = start_test_server().await;
    let (mut ws, _) = connect_player(&url).await;

    ws.send(Message::Text("not valid json".into())).await.unwrap();
    ws.send(Message::Text(r#"{"type":"paddle-move","direction":"sideways"}"#.into()))
        .await
        .unwrap();

    // The connection survives and still works.
    send_msg(&mut ws, ClientMsg::JoinRoom).await;
    assert!(matches!(recv_msg(&mut ws).await, ServerMsg::Waiting));
}

async fn assert_disconnected(ws: &mut Ws) {
    let mut disconnected = false;
    for _ in 0..10 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        match tokio::time::timeout(Duration::from_millis(100), ws.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => {
                disconnected = true;
                break;
            }
            Err(_) => {
                // Timeout - try sending to check if connection is dead
                if ws.send(Message::Ping(vec![].into())).await.is_err() {
                    disconnected = true;
                    break;
                }
            }
            _ => continue,
        }
    }
    assert!(disconnected, "Client should have been disconnected");
}

#[tokio::test]
async fn test_oversized_message_disconnects_client() {
    let url = start_test_server().await;
    let (mut ws, _) = connect_player(&url).await;

    let msg = format!(
        r#"{{"type":"join-room","extra":"{}"}}"#,
        "x".repeat(2000)
    );
    let _ = ws.send(Message::Text(msg.into())).await;

    assert_disconnected(&mut ws).await;
}

#[tokio::test]
async fn test_parse_spam_disconnects_client() {
    let url = start_test_server().await;
    let (mut ws, _) = connect_player(&url).await;

    for _ in 0..10 {
        let _ = ws.send(Message::Text("not valid json".into())).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_disconnected(&mut ws).await;
}

#[tokio::test]
async fn test_spammer_disconnect_frees_opponent() {
    let url = start_test_server().await;
    let (mut ws1, _, mut ws2, _, _) = start_match(&url).await;

    for _ in 0..10 {
        let _ = ws2.send(Message::Text("{".into())).await;
    }

    match recv_event(&mut ws1, Duration::from_secs(2)).await {
        Some(ServerMsg::PlayerDisconnected) => {}
        other => panic!("Expected PlayerDisconnected, got {:?}", other),
    }
}

/// Read until `game-end`, skipping updates.
async fn recv_game_end(ws: &mut Ws) -> GameSnapshot {
    match recv_event(ws, Duration::from_secs(10)).await {
        Some(ServerMsg::GameEnd(snapshot)) => snapshot,
        other => panic!("Expected GameEnd, got {:?}", other),
    }
}

#[tokio::test]
async fn test_match_ends_and_players_can_rejoin() {
    let url = start_test_server_with(|config| {
        config.tick_interval = Duration::from_millis(1);
        config.game.max_score = 1;
    })
    .await;
    let (mut ws1, id1, mut ws2, id2, room) = start_match(&url).await;

    let (end1, end2) = tokio::join!(recv_game_end(&mut ws1), recv_game_end(&mut ws2));
    assert_eq!(end1, end2);
    assert_eq!(end1.room_id, room);
    assert!(end1.game_ended);
    let scores = (end1.players[&id1].score, end1.players[&id2].score);
    let expected_winner = if scores.0 == 1 { "Player 1" } else { "Player 2" };
    assert_eq!(scores.0 + scores.1, 1);
    assert_eq!(end1.winner.as_deref(), Some(expected_winner));

    // Exactly one game-end and nothing after it.
    assert!(recv_msg_timeout(&mut ws1, Duration::from_millis(300)).await.is_none());
    assert!(recv_msg_timeout(&mut ws2, Duration::from_millis(300)).await.is_none());

    // The finished room no longer holds either player.
    send_msg(&mut ws1, ClientMsg::JoinRoom).await;
    assert!(matches!(
        recv_msg_timeout(&mut ws1, Duration::from_secs(2)).await,
        Some(ServerMsg::Waiting)
    ));
    send_msg(&mut ws2, ClientMsg::JoinRoom).await;
    let rematch1 = expect_game_start(&mut ws1).await;
    let rematch2 = expect_game_start(&mut ws2).await;
    assert_eq!(rematch1, rematch2);
    assert_ne!(rematch1, room);
}
