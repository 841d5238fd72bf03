//! Integration tests for end-to-end WebSocket play.
//!
//! These tests start a real server and connect real clients,
//! verifying the full sync pipeline.

use connect4_collab::client::{ConnectionState, GameClient, GameEvent};
use connect4_collab::protocol::{ChatMessage, ClientMessage, ServerMessage, WireFormat};
use std::sync::Arc;

use connect4_collab::registry::{RegistryConfig, SessionRegistry};
use connect4_collab::server::{GameServer, ServerConfig};
use connect4_core::{Cell, Direction, PlayerId, Snapshot};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::Message;

/// Find a free port for testing.
async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Start a server on a free port, return its URL.
async fn start_test_server() -> String {
    start_server_with(RegistryConfig::default()).await
}

async fn start_server_with(registry: RegistryConfig) -> String {
    start_server_with_registry(registry).await.0
}

/// Start a server and keep a handle on its registry.
async fn start_server_with_registry(registry: RegistryConfig) -> (String, Arc<SessionRegistry>) {
    let port = free_port().await;
    let config = ServerConfig {
        bind_addr: format!("127.0.0.1:{port}"),
        registry,
    };
    let server = GameServer::new(config);
    let registry = server.registry().clone();
    tokio::spawn(async move {
        server.run().await.unwrap();
    });
    // Give server time to bind
    tokio::time::sleep(Duration::from_millis(50)).await;
    (format!("ws://127.0.0.1:{port}"), registry)
}

/// Poll the client's chat log until it has `len` lines.
async fn wait_for_chat(client: &GameClient, len: usize) -> Vec<ChatMessage> {
    timeout(Duration::from_secs(5), async {
        loop {
            let log = client.chat_log().await;
            if log.len() >= len {
                return log;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("chat log filled within timeout")
}

async fn next_event(rx: &mut mpsc::Receiver<GameEvent>) -> GameEvent {
    timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event within timeout")
        .expect("event channel open")
}

async fn next_state(rx: &mut mpsc::Receiver<GameEvent>) -> Snapshot {
    match next_event(rx).await {
        GameEvent::StateChanged(snapshot) => snapshot,
        other => panic!("expected state change, got {other:?}"),
    }
}

async fn assert_quiet(rx: &mut mpsc::Receiver<GameEvent>) {
    let got = timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(got.is_err(), "expected no event, got {got:?}");
}

/// Connect a client and consume Connected, Welcome and the initial state.
async fn join(
    url: &str,
    token: &str,
) -> (GameClient, mpsc::Receiver<GameEvent>, Option<PlayerId>, Snapshot) {
    join_with(GameClient::new(url, token)).await
}

async fn join_with(
    mut client: GameClient,
) -> (GameClient, mpsc::Receiver<GameEvent>, Option<PlayerId>, Snapshot) {
    let mut events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();

    assert_eq!(next_event(&mut events).await, GameEvent::Connected);
    let seat = match next_event(&mut events).await {
        GameEvent::Welcome { player, .. } => player,
        other => panic!("expected welcome, got {other:?}"),
    };
    let snapshot = next_state(&mut events).await;
    (client, events, seat, snapshot)
}

/// Send a move and wait until every listed participant has seen it.
async fn play(
    mover: &GameClient,
    col: usize,
    watchers: &mut [&mut mpsc::Receiver<GameEvent>],
) -> Snapshot {
    mover.send_move(col).await.unwrap();
    let mut last = None;
    for rx in watchers.iter_mut() {
        last = Some(next_state(rx).await);
    }
    last.unwrap()
}

#[tokio::test]
async fn test_server_accepts_connections() {
    let url = start_test_server().await;
    let result = tokio_tungstenite::connect_async(format!("{url}/anything")).await;
    assert!(result.is_ok(), "Should connect to server");
}

#[tokio::test]
async fn test_join_fresh_token() {
    let url = start_test_server().await;
    let (client, _events, seat, snapshot) = join(&url, "fresh").await;

    assert_eq!(seat, Some(PlayerId::Player1));
    assert_eq!(snapshot.current_player, PlayerId::Player1);
    assert!(snapshot.winner.is_none());
    assert_eq!(snapshot.rows(), 6);
    assert_eq!(snapshot.cols(), 7);
    assert_eq!(snapshot.occupied().count(), 0);
    assert_eq!(client.connection_state().await, ConnectionState::Connected);
    assert!(client.is_my_turn().await);
}

#[tokio::test]
async fn test_seats_and_spectator() {
    let url = start_test_server().await;
    let (_c1, _e1, seat1, _) = join(&url, "seats").await;
    let (_c2, _e2, seat2, _) = join(&url, "seats").await;
    let (_c3, _e3, seat3, _) = join(&url, "seats").await;

    assert_eq!(seat1, Some(PlayerId::Player1));
    assert_eq!(seat2, Some(PlayerId::Player2));
    assert_eq!(seat3, None);
}

#[tokio::test]
async fn test_move_broadcast_to_all_participants() {
    let url = start_test_server().await;
    let (c1, mut e1, _, _) = join(&url, "bcast").await;
    let (_c2, mut e2, _, _) = join(&url, "bcast").await;
    let (_c3, mut e3, _, _) = join(&url, "bcast").await;

    c1.send_move(3).await.unwrap();

    for rx in [&mut e1, &mut e2, &mut e3] {
        let snapshot = next_state(rx).await;
        assert_eq!(snapshot.board[0][3], Cell::Player1);
        assert_eq!(snapshot.current_player, PlayerId::Player2);
    }
    assert_eq!(c1.snapshot().await.unwrap().board[0][3], Cell::Player1);
    assert!(!c1.is_my_turn().await);
}

#[tokio::test]
async fn test_rejected_move_goes_only_to_sender() {
    let url = start_test_server().await;
    let (_c1, mut e1, _, _) = join(&url, "reject").await;
    let (c2, mut e2, _, _) = join(&url, "reject").await;

    // Player 2 tries to move first.
    c2.send_move(0).await.unwrap();

    match next_event(&mut e2).await {
        GameEvent::Rejected(reason) => assert!(reason.contains("turn"), "{reason}"),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert_quiet(&mut e1).await;
}

#[tokio::test]
async fn test_spectator_move_rejected() {
    let url = start_test_server().await;
    let (_c1, mut e1, _, _) = join(&url, "watch").await;
    let (_c2, _e2, _, _) = join(&url, "watch").await;
    let (c3, mut e3, seat, _) = join(&url, "watch").await;
    assert_eq!(seat, None);

    c3.send(ClientMessage::make_move("watch", PlayerId::Player1, 0))
        .await
        .unwrap();
    assert!(matches!(next_event(&mut e3).await, GameEvent::Rejected(_)));
    assert_quiet(&mut e1).await;
}

#[tokio::test]
async fn test_game_to_victory_and_reset() {
    let url = start_test_server().await;
    let (c1, mut e1, _, _) = join(&url, "victory").await;
    let (c2, mut e2, _, _) = join(&url, "victory").await;

    for col in 0..3 {
        play(&c1, col, &mut [&mut e1, &mut e2]).await;
        play(&c2, col, &mut [&mut e1, &mut e2]).await;
    }
    let finished = play(&c1, 3, &mut [&mut e1, &mut e2]).await;

    let winner = finished.winner.expect("player 1 wins");
    assert_eq!(winner.player, PlayerId::Player1);
    assert_eq!(winner.direction, Direction::Horizontal);
    assert_eq!((winner.origin_row, winner.origin_col), (0, 3));
    assert_eq!(winner.cells(), [(0, 3), (0, 2), (0, 1), (0, 0)]);

    // No more moves once finished.
    c2.send_move(4).await.unwrap();
    assert!(matches!(next_event(&mut e2).await, GameEvent::Rejected(_)));

    c2.send_reset().await.unwrap();
    for rx in [&mut e1, &mut e2] {
        let snapshot = next_state(rx).await;
        assert_eq!(snapshot.occupied().count(), 0);
        assert_eq!(snapshot.current_player, PlayerId::Player1);
        assert!(snapshot.winner.is_none());
    }
}

#[tokio::test]
async fn test_reset_during_play_rejected() {
    let url = start_test_server().await;
    let (c1, mut e1, _, _) = join(&url, "early-reset").await;
    let (_c2, mut e2, _, _) = join(&url, "early-reset").await;

    play(&c1, 2, &mut [&mut e1, &mut e2]).await;
    c1.send_reset().await.unwrap();

    assert!(matches!(next_event(&mut e1).await, GameEvent::Rejected(_)));
    assert_quiet(&mut e2).await;
}

#[tokio::test]
async fn test_chat_broadcast_and_replay_on_reconnect() {
    let url = start_test_server().await;
    let (mut c1, mut e1, _, _) = join(&url, "chatty").await;
    let (_c2, mut e2, _, _) = join(&url, "chatty").await;

    play(&c1, 4, &mut [&mut e1, &mut e2]).await;
    for i in 0..3 {
        c1.send_chat("ann", format!("msg {i}")).await.unwrap();
    }
    for i in 0..3 {
        match next_event(&mut e2).await {
            GameEvent::Chat(line) => {
                assert_eq!(line.name, "ann");
                assert_eq!(line.message, format!("msg {i}"));
            }
            other => panic!("expected chat, got {other:?}"),
        }
    }

    // The sender sees its own lines too.
    for _ in 0..3 {
        assert!(matches!(next_event(&mut e1).await, GameEvent::Chat(_)));
    }

    // Player 1 drops and someone reconnects in their place.
    c1.disconnect();
    assert_eq!(next_event(&mut e1).await, GameEvent::Disconnected);
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (c3, mut e3, seat, snapshot) = join(&url, "chatty").await;
    assert_eq!(seat, Some(PlayerId::Player1));
    assert_eq!(snapshot.board[0][4], Cell::Player1);
    assert_eq!(snapshot.current_player, PlayerId::Player2);

    for i in 0..3 {
        match next_event(&mut e3).await {
            GameEvent::Chat(line) => assert_eq!(line.message, format!("msg {i}")),
            other => panic!("expected replayed chat, got {other:?}"),
        }
    }
    assert_quiet(&mut e3).await;
    assert_eq!(c3.chat_log().await.len(), 3);
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let url = start_test_server().await;
    let (a1, mut ea, _, _) = join(&url, "room-a").await;
    let (_b1, mut eb, _, _) = join(&url, "room-b").await;

    a1.send_move(0).await.unwrap();
    a1.send_chat("ann", "only a").await.unwrap();

    next_state(&mut ea).await;
    assert_quiet(&mut eb).await;
}

#[tokio::test]
async fn test_binary_and_json_clients_interoperate() {
    let url = start_test_server().await;
    let (json, mut ej, _, _) = join(&url, "mixed").await;
    let (binary, mut eb, seat, _) =
        join_with(GameClient::new(&url, "mixed").with_format(WireFormat::Binary)).await;
    assert_eq!(seat, Some(PlayerId::Player2));

    play(&json, 3, &mut [&mut ej, &mut eb]).await;
    let snapshot = play(&binary, 3, &mut [&mut ej, &mut eb]).await;
    assert_eq!(snapshot.board[1][3], Cell::Player2);
    assert_eq!(snapshot.current_player, PlayerId::Player1);
}

#[tokio::test]
async fn test_create_generates_token() {
    let url = start_test_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("{url}/new"))
        .await
        .unwrap();

    ws.send(Message::Text(r#"{"create":{}}"#.into())).await.unwrap();
    let frame = timeout(Duration::from_secs(2), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    match ServerMessage::decode(&frame).unwrap().unwrap().0 {
        ServerMessage::Welcome { token, player } => {
            assert_eq!(token.len(), 32);
            assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
            assert_eq!(player, Some(PlayerId::Player1));
        }
        other => panic!("expected welcome, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection() {
    let url = start_test_server().await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("{url}/junk"))
        .await
        .unwrap();

    ws.send(Message::Text("{not json".into())).await.unwrap();
    let frame = timeout(Duration::from_secs(2), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(
        ServerMessage::decode(&frame).unwrap().unwrap().0,
        ServerMessage::Rejected { .. }
    ));

    ws.send(Message::Text(r#""ping""#.into())).await.unwrap();
    let frame = timeout(Duration::from_secs(2), ws.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(
        ServerMessage::decode(&frame).unwrap().unwrap().0,
        ServerMessage::Pong
    );
}

#[tokio::test]
async fn test_unknown_token_refused_when_creation_disabled() {
    let url = start_server_with(RegistryConfig {
        create_on_join: false,
        ..RegistryConfig::default()
    })
    .await;

    let mut client = GameClient::new(&url, "missing");
    let mut events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();

    assert_eq!(next_event(&mut events).await, GameEvent::Connected);
    assert!(matches!(next_event(&mut events).await, GameEvent::Rejected(_)));
}

#[tokio::test]
async fn test_ping_pong() {
    let url = start_test_server().await;
    let (client, mut events, _, _) = join(&url, "ping").await;
    client.send_ping().await.unwrap();
    assert_eq!(next_event(&mut events).await, GameEvent::Pong);
}

#[tokio::test]
async fn test_lagging_client_keeps_full_chat_log() {
    let (url, registry) = start_server_with_registry(RegistryConfig {
        broadcast_capacity: 1,
        ..RegistryConfig::default()
    })
    .await;
    let (client, _events, _, _) = join(&url, "burst").await;

    for i in 0..50 {
        registry.chat("burst", "bot", i.to_string()).await.unwrap();
    }

    let log = wait_for_chat(&client, 50).await;
    assert_eq!(log, registry.chat_history("burst").await.unwrap());
}

#[tokio::test]
async fn test_undrained_events_do_not_stall_view() {
    let (url, registry) = start_server_with_registry(RegistryConfig::default()).await;
    let mut client = GameClient::new(&url, "undrained");
    // Held but never read.
    let _events = client.take_event_rx().unwrap();
    client.connect().await.unwrap();

    // Wait until the server has attached us.
    timeout(Duration::from_secs(2), async {
        while client.seat().await.is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("welcome within timeout");

    for i in 0..400 {
        registry.chat("undrained", "bot", i.to_string()).await.unwrap();
    }

    let log = wait_for_chat(&client, 400).await;
    assert_eq!(log.len(), 400);
    assert_eq!(log[399].message, "399");
    assert_eq!(client.connection_state().await, ConnectionState::Connected);
}
