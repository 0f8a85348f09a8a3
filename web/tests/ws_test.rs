//! Integration tests for the WebSocket relay: lifecycle, broadcasts, private
//! routing and error replies, driven through real sockets.

use clap::Parser;
use futures::{SinkExt, StreamExt};
use relay::log_sink::MemoryLogSink;
use serde_json::{json, Value};
use service::{config::Config, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const SILENCE_WINDOW: Duration = Duration::from_millis(300);

/// Helper: start the relay on a random port and return its state and address.
async fn start_test_server() -> (AppState, SocketAddr) {
    let config = Config::try_parse_from(["chat_relay"]).expect("default config parses");
    let state = AppState::with_log_sink(config, Arc::new(MemoryLogSink::new()));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server_state = state.clone();
    tokio::spawn(async move {
        web::serve(listener, server_state, std::future::pending())
            .await
            .unwrap();
    });

    (state, addr)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("WebSocket handshake succeeds");
    client
}

async fn send(client: &mut Client, body: Value) {
    send_raw(client, &body.to_string()).await;
}

async fn send_raw(client: &mut Client, body: &str) {
    client
        .send(Message::Text(body.to_string().into()))
        .await
        .unwrap();
}

/// Wait for the next text frame and decode it.
async fn next_json(client: &mut Client) -> Value {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .expect("receive error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

/// Assert no text frame arrives within the silence window.
async fn expect_silence(client: &mut Client) {
    if let Ok(Some(Ok(Message::Text(text)))) =
        tokio::time::timeout(SILENCE_WINDOW, client.next()).await
    {
        panic!("expected no message, got {}", text.as_str());
    }
}

async fn set_name(client: &mut Client, name: &str) {
    send(client, json!({"action": "setName", "name": name})).await;
}

/// Connect alice and bob and drain their join traffic.
async fn alice_and_bob(addr: SocketAddr) -> (Client, Client) {
    let mut alice = connect(addr).await;
    let mut bob = connect(addr).await;

    set_name(&mut alice, "alice").await;
    assert_eq!(next_json(&mut alice).await, json!({"members": ["alice"]}));
    assert_eq!(
        next_json(&mut alice).await,
        json!({"systemMessage": "alice has joined the chat"})
    );

    set_name(&mut bob, "bob").await;
    for client in [&mut alice, &mut bob] {
        assert_eq!(next_json(client).await, json!({"members": ["alice", "bob"]}));
        assert_eq!(
            next_json(client).await,
            json!({"systemMessage": "bob has joined the chat"})
        );
    }

    (alice, bob)
}

#[tokio::test]
async fn test_unnamed_connection_receives_no_broadcasts() {
    let (_state, addr) = start_test_server().await;
    let mut alice = connect(addr).await;
    let mut lurker = connect(addr).await;

    set_name(&mut alice, "alice").await;
    assert_eq!(next_json(&mut alice).await, json!({"members": ["alice"]}));

    expect_silence(&mut lurker).await;
}

#[tokio::test]
async fn test_join_broadcasts_members_and_system_message() {
    let (state, addr) = start_test_server().await;
    let _clients = alice_and_bob(addr).await;

    assert_eq!(state.registry.all_names(), vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_public_message_reaches_everyone() {
    let (_state, addr) = start_test_server().await;
    let (mut alice, mut bob) = alice_and_bob(addr).await;

    send(&mut alice, json!({"action": "sendPublic", "message": "hi"})).await;

    assert_eq!(next_json(&mut alice).await, json!({"publicMessage": "alice: hi"}));
    assert_eq!(next_json(&mut bob).await, json!({"publicMessage": "alice: hi"}));
}

#[tokio::test]
async fn test_private_message_reaches_only_the_recipient() {
    let (_state, addr) = start_test_server().await;
    let (mut alice, mut bob) = alice_and_bob(addr).await;

    send(
        &mut alice,
        json!({"action": "sendPrivate", "to": "bob", "message": "secret"}),
    )
    .await;

    assert_eq!(
        next_json(&mut bob).await,
        json!({"privateMessage": "alice: secret"})
    );
    expect_silence(&mut alice).await;
}

#[tokio::test]
async fn test_public_message_from_unnamed_connection_is_ignored() {
    let (_state, addr) = start_test_server().await;
    let (mut alice, _bob) = alice_and_bob(addr).await;
    let mut stranger = connect(addr).await;

    send(&mut stranger, json!({"action": "sendPublic", "message": "hello?"})).await;

    expect_silence(&mut stranger).await;
    expect_silence(&mut alice).await;
}

#[tokio::test]
async fn test_malformed_body_gets_an_error_reply() {
    let (_state, addr) = start_test_server().await;
    let (mut alice, mut bob) = alice_and_bob(addr).await;

    send_raw(&mut alice, "definitely not json").await;

    assert_eq!(
        next_json(&mut alice).await,
        json!({"error": "Failed to process message"})
    );
    expect_silence(&mut bob).await;
}

#[tokio::test]
async fn test_unrecognized_action_is_silently_ignored() {
    let (_state, addr) = start_test_server().await;
    let (mut alice, _bob) = alice_and_bob(addr).await;

    send(&mut alice, json!({"action": "dance"})).await;

    expect_silence(&mut alice).await;
}

#[tokio::test]
async fn test_disconnect_announces_departure_and_updates_members() {
    let (state, addr) = start_test_server().await;
    let (mut alice, mut bob) = alice_and_bob(addr).await;

    alice.close(None).await.unwrap();

    assert_eq!(
        next_json(&mut bob).await,
        json!({"systemMessage": "alice has left the chat"})
    );
    assert_eq!(next_json(&mut bob).await, json!({"members": ["bob"]}));
    assert_eq!(state.registry.all_names(), vec!["bob"]);
}

#[tokio::test]
async fn test_health_reports_members_and_open_connections() {
    let (_state, addr) = start_test_server().await;
    let (_alice, _bob) = alice_and_bob(addr).await;
    let _lurker = connect(addr).await;
    // Give the server a moment to register the lurker's socket
    tokio::time::sleep(Duration::from_millis(100)).await;

    let body: Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status_code"], 200);
    assert_eq!(body["data"]["status"], "healthy");
    assert_eq!(body["data"]["members"], 2);
    assert_eq!(body["data"]["open_connections"], 3);
}
