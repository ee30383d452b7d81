// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc,
    clippy::missing_docs_in_private_items
)]

//! `ChatSession` over a real WebSocket server.
//!
//! The server side is a bare `tokio-tungstenite` acceptor driven step by
//! step from the test body, so each test scripts exactly what the
//! assistant service says and when it hangs up.

use std::time::Duration;

use boardroom::session::{ChatSession, ConnectionState, ReconnectPolicy, SessionConfig, SessionSnapshot};
use boardroom::transport::UserId;
use boardroom::transport::websocket::WebSocketTransport;
use boardroom_proto::frame::{MessageContent, Sender};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

const WAIT: Duration = Duration::from_secs(5);

fn fast_config() -> SessionConfig {
    SessionConfig {
        reconnect: ReconnectPolicy {
            base_delay: Duration::from_millis(50),
            max_attempts: 3,
        },
        connect_timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    }
}

async fn start() -> (TcpListener, ChatSession) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let transport = WebSocketTransport::new(&base).unwrap();
    let (session, _events) = ChatSession::spawn(transport, fast_config());
    (listener, session)
}

/// Accept one WebSocket upgrade and return the requested path.
async fn accept(listener: &TcpListener) -> (String, WebSocketStream<TcpStream>) {
    let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("client never connected")
        .unwrap();
    let mut path = String::new();
    let ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        path = req.uri().path().to_string();
        Ok(resp)
    })
    .await
    .unwrap();
    (path, ws)
}

/// Refuse one upgrade with `403 Forbidden`.
async fn refuse(listener: &TcpListener) {
    let (stream, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .expect("client never connected")
        .unwrap();
    let result = tokio_tungstenite::accept_hdr_async(stream, |_: &Request, _: Response| {
        let mut denied = ErrorResponse::new(Some("unknown user".to_string()));
        *denied.status_mut() = StatusCode::FORBIDDEN;
        Err(denied)
    })
    .await;
    assert!(result.is_err());
}

async fn until(
    session: &ChatSession,
    predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    tokio::time::timeout(WAIT, session.wait_for(predicate))
        .await
        .expect("session never reached the expected state")
        .unwrap()
}

async fn send_text(ws: &mut WebSocketStream<TcpStream>, text: &str) {
    ws.send(Message::Text(text.into())).await.unwrap();
}

#[tokio::test]
async fn chat_round_trip_over_websocket() {
    let (listener, session) = start().await;
    session.connect(UserId::new("alice")).await.unwrap();

    let (path, mut ws) = accept(&listener).await;
    assert_eq!(path, "/ws/alice");
    until(&session, |s| s.status.is_connected()).await;

    send_text(&mut ws, r#"{"type":"connection_ack"}"#).await;
    send_text(&mut ws, r#"{"content":"Hi alice, how can I help?","sender":"assistant"}"#).await;
    let snap = until(&session, |s| {
        s.messages
            .last()
            .is_some_and(|m| m.sender == Sender::Assistant)
    })
    .await;
    assert_eq!(
        snap.messages.last().unwrap().content.as_text(),
        Some("Hi alice, how can I help?")
    );
    // Connection announcement plus the greeting; the ack is not shown.
    assert_eq!(snap.messages.len(), 2);

    session.send("what is due this week?").await.unwrap();
    let Some(Ok(Message::Text(sent))) = tokio::time::timeout(WAIT, ws.next()).await.unwrap() else {
        panic!("expected a text frame from the client");
    };
    let body: serde_json::Value = serde_json::from_str(sent.as_str()).unwrap();
    assert_eq!(body, serde_json::json!({ "message": "what is due this week?" }));

    send_text(
        &mut ws,
        r#"{"content":[{"title":"Build churn dashboard","priority":"high","progress":60,"deadline":"2026-03-05"},{"title":"Set up export to CSV"}]}"#,
    )
    .await;
    let snap = until(&session, |s| {
        matches!(
            s.messages.last().map(|m| &m.content),
            Some(MessageContent::Tasks(_))
        )
    })
    .await;
    let MessageContent::Tasks(tasks) = &snap.messages.last().unwrap().content else {
        unreachable!();
    };
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].title, "Build churn dashboard");
    assert!(snap.responding);
}

#[tokio::test]
async fn server_close_triggers_automatic_reconnect() {
    let (listener, session) = start().await;
    session.connect(UserId::new("alice")).await.unwrap();
    let (_, mut ws) = accept(&listener).await;
    until(&session, |s| s.status.is_connected()).await;

    ws.close(None).await.unwrap();
    let snap = until(&session, |s| s.status.attempts() == 1).await;
    assert!(
        snap.status
            .last_error()
            .unwrap()
            .starts_with("Connection lost")
    );

    let (path, _ws) = accept(&listener).await;
    assert_eq!(path, "/ws/alice");
    let snap = until(&session, |s| s.status.is_connected()).await;
    assert_eq!(snap.status.attempts(), 0);
}

#[tokio::test]
async fn refused_handshakes_exhaust_the_budget() {
    let (listener, session) = start().await;
    session.connect(UserId::new("alice")).await.unwrap();

    for _ in 0..4 {
        refuse(&listener).await;
    }
    let snap = until(&session, |s| {
        s.status
            .last_error()
            .is_some_and(|e| e.starts_with("Connection lost after 3 attempts"))
    })
    .await;
    assert_eq!(snap.status.state(), ConnectionState::Disconnected);
    assert!(snap.status.last_error().unwrap().contains("403"));

    session.reconnect().await.unwrap();
    let (_, _ws) = accept(&listener).await;
    let snap = until(&session, |s| s.status.is_connected()).await;
    assert_eq!(snap.status.attempts(), 0);
}

#[tokio::test]
async fn switching_identity_reconnects_under_new_path() {
    let (listener, session) = start().await;
    session.connect(UserId::new("alice")).await.unwrap();
    let (_, mut alice) = accept(&listener).await;
    until(&session, |s| s.status.is_connected()).await;

    session.switch_user(UserId::new("bob")).await.unwrap();
    let (path, _bob) = accept(&listener).await;
    assert_eq!(path, "/ws/bob");
    until(&session, |s| s.status.is_connected() && s.user == Some(UserId::new("bob"))).await;

    // The old socket was closed by the client.
    let next = tokio::time::timeout(WAIT, alice.next()).await.unwrap();
    assert!(matches!(next, None | Some(Ok(Message::Close(_)) | Err(_))));
}
