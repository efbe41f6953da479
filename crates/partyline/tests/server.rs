//! Integration tests for the Partyline server, handler, and request layer.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use partyline::prelude::*;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;

// =========================================================================
// Helpers
// =========================================================================

type ClientWs = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

/// Starts a server on a random port and returns its address and API.
async fn start_server() -> (String, ApiHandler) {
    start_server_with(PartylineServerBuilder::new()).await
}

async fn start_server_with(builder: PartylineServerBuilder) -> (String, ApiHandler) {
    let server = builder
        .bind("127.0.0.1:0")
        .build()
        .await
        .expect("server should build");

    let addr = server
        .local_addr()
        .expect("should have local addr")
        .to_string();
    let api = server.api();

    tokio::spawn(async move {
        let _ = server.run().await;
    });

    // Give the accept loop a moment to start.
    tokio::time::sleep(Duration::from_millis(10)).await;
    (addr, api)
}

/// Opens a socket on `path`, offering `protocol` as the only sub-protocol.
async fn connect(addr: &str, path: &str, protocol: Option<&str>) -> ClientWs {
    let mut request = format!("ws://{addr}{path}")
        .into_client_request()
        .expect("valid url");
    if let Some(p) = protocol {
        request
            .headers_mut()
            .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_str(p).expect("valid header"));
    }
    let (ws, _) = tokio_tungstenite::connect_async(request)
        .await
        .expect("should connect");
    ws
}

/// Opens the socket a device would open with the properties it was given.
async fn connect_as(addr: &str, props: &GameInstanceProperties) -> ClientWs {
    let path = format!("/talk/{}/{}", props.room_id, props.personal_id);
    let protocol = format!("{SECRET_PREFIX}{}", props.personal_secret);
    connect(addr, &path, Some(&protocol)).await
}

fn frame(sender: &str, receiver: &str, payload: &str) -> String {
    format!(r#"{{"s":"{sender}","r":"{receiver}"}}^{payload}"#)
}

async fn next_text(ws: &mut ClientWs) -> String {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("recv failed");
        match msg {
            Message::Text(text) => return text.as_str().to_owned(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

/// Waits for the server to close the socket and returns the close code.
async fn expect_close(ws: &mut ClientWs) -> u16 {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), ws.next())
            .await
            .expect("timed out waiting for close");
        match msg {
            Some(Ok(Message::Close(Some(close)))) => return u16::from(close.code),
            Some(Ok(Message::Close(None))) => panic!("close frame without a code"),
            Some(Ok(_)) => continue,
            other => panic!("expected close frame, got {other:?}"),
        }
    }
}

/// Sends a frame to ourselves and waits for it, which only works once the
/// server has bound this socket.
async fn wait_until_bound(ws: &mut ClientWs, personal_id: &str) {
    let ping = frame(personal_id, personal_id, "ready?");
    ws.send(Message::Text(ping.clone().into()))
        .await
        .expect("send ping");
    assert_eq!(next_text(ws).await, ping);
}

async fn start_and_join(api: &ApiHandler) -> (GameInstanceProperties, GameInstanceProperties) {
    let presenter = api
        .start_game(StartGameRequest {
            game_name: "Lexible".into(),
            existing_room: None,
        })
        .await
        .expect("start should succeed");
    let player = api
        .join_game(JoinGameRequest {
            room_id: presenter.room_id.clone(),
            player_name: "Alice".into(),
        })
        .await
        .expect("join should succeed");
    (presenter, player)
}

// =========================================================================
// Routing
// =========================================================================

#[tokio::test]
async fn test_frames_route_between_presenter_and_player() {
    let (addr, api) = start_server().await;
    let (presenter, player) = start_and_join(&api).await;

    let mut presenter_ws = connect_as(&addr, &presenter).await;
    let mut player_ws = connect_as(&addr, &player).await;
    wait_until_bound(&mut presenter_ws, &presenter.personal_id).await;
    wait_until_bound(&mut player_ws, &player.personal_id).await;

    let guess = frame(&player.personal_id, &presenter.personal_id, r#"{"type":"Guess","word":"CLUSTER"}"#);
    player_ws.send(Message::Text(guess.clone().into())).await.unwrap();
    assert_eq!(next_text(&mut presenter_ws).await, guess);

    let reply = frame(&presenter.personal_id, &player.personal_id, r#"{"type":"Score","points":7}"#);
    presenter_ws.send(Message::Text(reply.clone().into())).await.unwrap();
    assert_eq!(next_text(&mut player_ws).await, reply);
}

#[tokio::test]
async fn test_frame_to_unbound_receiver_is_dropped() {
    let (addr, api) = start_server().await;
    let (presenter, player) = start_and_join(&api).await;

    // The player never connects.
    let mut presenter_ws = connect_as(&addr, &presenter).await;
    wait_until_bound(&mut presenter_ws, &presenter.personal_id).await;

    let lost = frame(&presenter.personal_id, &player.personal_id, "hello?");
    presenter_ws.send(Message::Text(lost.into())).await.unwrap();

    // The connection stays usable.
    wait_until_bound(&mut presenter_ws, &presenter.personal_id).await;
}

#[tokio::test]
async fn test_reconnect_replaces_previous_socket() {
    let (addr, api) = start_server().await;
    let (presenter, player) = start_and_join(&api).await;

    let mut first = connect_as(&addr, &player).await;
    wait_until_bound(&mut first, &player.personal_id).await;

    let mut second = connect_as(&addr, &player).await;
    assert_eq!(expect_close(&mut first).await, CloseCode::Normal.code());
    wait_until_bound(&mut second, &player.personal_id).await;

    let mut presenter_ws = connect_as(&addr, &presenter).await;
    wait_until_bound(&mut presenter_ws, &presenter.personal_id).await;
    let hello = frame(&presenter.personal_id, &player.personal_id, "welcome back");
    presenter_ws.send(Message::Text(hello.clone().into())).await.unwrap();
    assert_eq!(next_text(&mut second).await, hello);
}

// =========================================================================
// Rejected bindings
// =========================================================================

#[tokio::test]
async fn test_missing_secret_closes_with_policy_violation() {
    let (addr, api) = start_server().await;
    let (_, player) = start_and_join(&api).await;

    let path = format!("/talk/{}/{}", player.room_id, player.personal_id);
    let mut ws = connect(&addr, &path, None).await;
    assert_eq!(expect_close(&mut ws).await, CloseCode::PolicyViolation.code());
}

#[tokio::test]
async fn test_protocol_without_secret_prefix_closes_with_policy_violation() {
    let (addr, api) = start_server().await;
    let (_, player) = start_and_join(&api).await;

    let path = format!("/talk/{}/{}", player.room_id, player.personal_id);
    let mut ws = connect(&addr, &path, Some(&player.personal_secret)).await;
    assert_eq!(expect_close(&mut ws).await, CloseCode::PolicyViolation.code());
}

#[tokio::test]
async fn test_bad_secret_closes_with_policy_violation() {
    let (addr, api) = start_server().await;
    let (_, player) = start_and_join(&api).await;

    let impostor = GameInstanceProperties {
        personal_secret: "0".repeat(36),
        ..player
    };
    let mut ws = connect_as(&addr, &impostor).await;
    assert_eq!(expect_close(&mut ws).await, CloseCode::PolicyViolation.code());

    let errors = api.registry().telemetry().summary_for("GeneralError_socket");
    assert_eq!(errors.map(|d| d.count), Some(1));
}

#[tokio::test]
async fn test_unknown_room_closes_with_policy_violation() {
    let (addr, api) = start_server().await;
    let (_, player) = start_and_join(&api).await;

    let stray = GameInstanceProperties {
        room_id: "ZZZZZZ".into(),
        ..player
    };
    let mut ws = connect_as(&addr, &stray).await;
    assert_eq!(expect_close(&mut ws).await, CloseCode::PolicyViolation.code());
}

#[tokio::test]
async fn test_bad_path_closes_with_policy_violation() {
    let (addr, api) = start_server().await;
    let (_, player) = start_and_join(&api).await;

    let protocol = format!("{SECRET_PREFIX}{}", player.personal_secret);
    let mut ws = connect(&addr, &format!("/talk/{}", player.room_id), Some(&protocol)).await;
    assert_eq!(expect_close(&mut ws).await, CloseCode::PolicyViolation.code());
}

// =========================================================================
// Misbehaving sockets
// =========================================================================

#[tokio::test]
async fn test_spoofed_sender_closes_with_unsupported_data() {
    let (addr, api) = start_server().await;
    let (presenter, player) = start_and_join(&api).await;

    let mut player_ws = connect_as(&addr, &player).await;
    wait_until_bound(&mut player_ws, &player.personal_id).await;

    let spoof = frame(&presenter.personal_id, &player.personal_id, "trust me");
    player_ws.send(Message::Text(spoof.into())).await.unwrap();
    assert_eq!(expect_close(&mut player_ws).await, CloseCode::UnsupportedData.code());
}

#[tokio::test]
async fn test_frame_without_header_closes_with_unsupported_data() {
    let (addr, api) = start_server().await;
    let (_, player) = start_and_join(&api).await;

    let mut player_ws = connect_as(&addr, &player).await;
    wait_until_bound(&mut player_ws, &player.personal_id).await;

    player_ws
        .send(Message::Text("no delimiter here".into()))
        .await
        .unwrap();
    assert_eq!(expect_close(&mut player_ws).await, CloseCode::UnsupportedData.code());
}

#[tokio::test]
async fn test_utf8_binary_frame_is_routed_as_text() {
    let (addr, api) = start_server().await;
    let (presenter, player) = start_and_join(&api).await;

    let mut presenter_ws = connect_as(&addr, &presenter).await;
    let mut player_ws = connect_as(&addr, &player).await;
    wait_until_bound(&mut presenter_ws, &presenter.personal_id).await;
    wait_until_bound(&mut player_ws, &player.personal_id).await;

    let sent = frame(&player.personal_id, &presenter.personal_id, r#"{"buzz":true}"#);
    player_ws
        .send(Message::Binary(sent.clone().into_bytes().into()))
        .await
        .unwrap();
    assert_eq!(next_text(&mut presenter_ws).await, sent);
}

#[tokio::test]
async fn test_non_utf8_binary_frame_closes_with_unsupported_data() {
    let (addr, api) = start_server().await;
    let (_, player) = start_and_join(&api).await;

    let mut player_ws = connect_as(&addr, &player).await;
    wait_until_bound(&mut player_ws, &player.personal_id).await;

    player_ws
        .send(Message::Binary(vec![0xffu8, 0xfe, 0x00].into()))
        .await
        .unwrap();
    assert_eq!(expect_close(&mut player_ws).await, CloseCode::UnsupportedData.code());
}

// =========================================================================
// Accept loop and background sweeps
// =========================================================================

#[tokio::test]
async fn test_silent_tcp_peer_does_not_block_other_sockets() {
    let (addr, api) = start_server().await;
    let (presenter, _) = start_and_join(&api).await;

    // Connects but never sends an upgrade request.
    let _silent = tokio::net::TcpStream::connect(&addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;

    let mut presenter_ws = tokio::time::timeout(Duration::from_secs(5), connect_as(&addr, &presenter))
        .await
        .expect("connect should not wait on the silent peer");
    wait_until_bound(&mut presenter_ws, &presenter.personal_id).await;
}

#[tokio::test]
async fn test_silent_tcp_peer_is_dropped_after_handshake_timeout() {
    use tokio::io::AsyncReadExt;

    let (addr, _api) = start_server_with(
        PartylineServerBuilder::new().handshake_timeout(Duration::from_millis(100)),
    )
    .await;

    let mut silent = tokio::net::TcpStream::connect(&addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), silent.read(&mut buf))
        .await
        .expect("server should hang up on the silent peer");
    assert_eq!(read.unwrap_or(0), 0);
}

#[tokio::test]
async fn test_purge_sweep_removes_inactive_rooms() {
    let (_addr, api) = start_server_with(
        PartylineServerBuilder::new()
            .room_config(RoomConfig::default().with_inactivity_window(Duration::from_millis(50)))
            .purge_interval(Duration::from_millis(100)),
    )
    .await;
    let presenter = api
        .start_game(StartGameRequest {
            game_name: "Lexible".into(),
            existing_room: None,
        })
        .await
        .unwrap();

    let registry = api.registry().clone();
    tokio::time::timeout(Duration::from_secs(5), async {
        while registry.get_room(&presenter.room_id).await.is_some() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("the sweep should purge the idle room");
    assert_eq!(registry.room_count().await, 0);
}

// =========================================================================
// Request layer
// =========================================================================

#[tokio::test]
async fn test_terminate_game_closes_sockets_and_blocks_joins() {
    let (addr, api) = start_server().await;
    let (presenter, player) = start_and_join(&api).await;

    let mut player_ws = connect_as(&addr, &player).await;
    wait_until_bound(&mut player_ws, &player.personal_id).await;

    let ack = api
        .terminate_game(TerminateGameRequest {
            room_id: presenter.room_id.clone(),
            presenter_secret: presenter.personal_secret.clone(),
        })
        .await
        .expect("presenter may terminate");
    assert_eq!(ack, TerminateGameResponse::ok());
    assert_eq!(expect_close(&mut player_ws).await, CloseCode::Normal.code());

    let err = api
        .join_game(JoinGameRequest {
            room_id: presenter.room_id.clone(),
            player_name: "Bob".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.status, 400);
}

#[tokio::test]
async fn test_terminate_game_rejects_player_secret() {
    let (_, api) = start_server().await;
    let (presenter, player) = start_and_join(&api).await;

    let err = api
        .terminate_game(TerminateGameRequest {
            room_id: presenter.room_id.clone(),
            presenter_secret: player.personal_secret.clone(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.status, 400);

    // The room is still open for business.
    api.join_game(JoinGameRequest {
        room_id: presenter.room_id,
        player_name: "Bob".into(),
    })
    .await
    .expect("room should still accept joins");
}

#[tokio::test]
async fn test_start_game_without_name_is_client_error() {
    let (_, api) = start_server().await;

    let err = api
        .start_game(StartGameRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(err.error_message, "Game name not specified");

    let bad = api.registry().telemetry().summary_for("BadRoomCreation");
    assert_eq!(bad.map(|d| d.count), Some(1));
}

#[tokio::test]
async fn test_start_game_resumes_existing_room() {
    let (_, api) = start_server().await;
    let (presenter, _) = start_and_join(&api).await;

    let resumed = api
        .start_game(StartGameRequest {
            game_name: "Testato".into(),
            existing_room: Some(ExistingRoom {
                id: presenter.room_id.clone(),
                presenter_id: presenter.personal_id.clone(),
                presenter_secret: presenter.personal_secret.clone(),
            }),
        })
        .await
        .expect("resume should succeed");

    assert_eq!(resumed.room_id, presenter.room_id);
    assert_eq!(resumed.personal_id, presenter.personal_id);
    assert_eq!(resumed.personal_secret, presenter.personal_secret);
    assert_eq!(resumed.game_name, "Testato");
    assert_eq!(resumed.role, GameRole::Presenter);
}

#[tokio::test]
async fn test_join_game_bad_input_is_client_error() {
    let (_, api) = start_server().await;

    let err = api
        .join_game(JoinGameRequest {
            room_id: "TOOLONG".into(),
            player_name: "Alice".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.status, 400);
    assert_eq!(err.error_message, "Invalid Room Code (TOOLONG)");

    let err = api
        .join_game(JoinGameRequest {
            room_id: "QZVK".into(),
            player_name: String::new(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.error_message, "Invalid Player name: ()");

    let bad = api.registry().telemetry().summary_for("BadJoin");
    assert_eq!(bad.map(|d| d.count), Some(2));
}

#[tokio::test]
async fn test_health_reports_rooms_and_traffic() {
    let (addr, api) = start_server().await;
    let (presenter, _) = start_and_join(&api).await;

    let mut presenter_ws = connect_as(&addr, &presenter).await;
    wait_until_bound(&mut presenter_ws, &presenter.personal_id).await;

    let report = api
        .health(HealthParams::default())
        .await
        .expect("health should succeed");

    assert_eq!(report.rooms.room_count, 1);
    assert_eq!(report.rooms.active_rooms, 1);
    let received = report
        .summary
        .iter()
        .find(|col| col.label == "MessageReceive")
        .expect("received frames are summarized");
    assert_eq!(received.data.count, 1);
    assert!(!report.series.is_empty());

    let body = serde_json::to_value(&report).expect("report serializes");
    assert!(body.get("cpuUsage").is_some());
    assert!(body.get("memoryUsage").is_some());
}
