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

//! `ChatSession` over server-sent events.
//!
//! An in-process axum service plays the assistant: `GET /events/{user}`
//! streams frames, `POST /chat/{user}` accepts messages and answers with
//! a `{ success, error }` acknowledgement. Replies are pushed onto the
//! event stream before the POST returns, the way a fast assistant does.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use boardroom::session::{ChatSession, ReconnectPolicy, SessionConfig, SessionSnapshot};
use boardroom::transport::UserId;
use boardroom::transport::sse::SseTransport;
use boardroom_proto::frame::Sender;
use futures_util::Stream;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone, Default)]
struct Service {
    streams: Arc<Mutex<HashMap<String, mpsc::Sender<Event>>>>,
    posts: Arc<Mutex<Vec<(String, Value)>>>,
    reject: Arc<AtomicBool>,
    opens: Arc<AtomicUsize>,
}

impl Service {
    fn stream(&self, user: &str) -> mpsc::Sender<Event> {
        self.streams
            .lock()
            .get(user)
            .cloned()
            .expect("no open stream for user")
    }

    async fn push(&self, user: &str, data: &str) {
        self.stream(user)
            .send(Event::default().data(data))
            .await
            .unwrap();
    }

    fn end_stream(&self, user: &str) {
        self.streams.lock().remove(user);
    }
}

async fn events(
    State(service): State<Service>,
    Path(user): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel(16);
    service.streams.lock().insert(user, tx);
    service.opens.fetch_add(1, Ordering::SeqCst);
    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|event| (Ok(event), rx))
    });
    Sse::new(stream)
}

async fn chat(
    State(service): State<Service>,
    Path(user): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    if service.reject.load(Ordering::SeqCst) {
        return Json(json!({ "success": false, "error": "assistant busy" }));
    }
    let text = body["message"].as_str().unwrap_or_default().to_string();
    service.posts.lock().push((user.clone(), body));

    let stream = service.streams.lock().get(&user).cloned();
    if let Some(stream) = stream {
        let reply = json!({ "content": format!("echo: {text}") }).to_string();
        let _ = stream.send(Event::default().data(reply)).await;
    }
    Json(json!({ "success": true }))
}

async fn start() -> (Service, ChatSession) {
    let service = Service::default();
    let app = Router::new()
        .route("/events/{user}", get(events))
        .route("/chat/{user}", post(chat))
        .with_state(service.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let config = SessionConfig {
        reconnect: ReconnectPolicy {
            base_delay: Duration::from_millis(50),
            max_attempts: 3,
        },
        connect_timeout: Duration::from_secs(2),
        ..SessionConfig::default()
    };
    let (session, _events) = ChatSession::spawn(SseTransport::new(&base).unwrap(), config);
    (service, session)
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

fn has_text(snapshot: &SessionSnapshot, text: &str) -> bool {
    snapshot
        .messages
        .iter()
        .any(|m| m.content.as_text() == Some(text))
}

#[tokio::test]
async fn stream_in_requests_out() {
    let (service, session) = start().await;
    session.connect(UserId::new("alice")).await.unwrap();
    until(&session, |s| s.status.is_connected()).await;

    service.push("alice", r#"{"type":"heartbeat"}"#).await;
    service.push("alice", r#"{"content":"Welcome back"}"#).await;
    until(&session, |s| has_text(s, "Welcome back")).await;

    session.send("hello").await.unwrap();
    let snap = until(&session, |s| has_text(s, "echo: hello")).await;

    let user_index = snap
        .messages
        .iter()
        .position(|m| m.sender == Sender::User)
        .unwrap();
    let reply_index = snap
        .messages
        .iter()
        .position(|m| m.content.as_text() == Some("echo: hello"))
        .unwrap();
    assert!(user_index < reply_index);
    assert_eq!(
        service.posts.lock().as_slice(),
        &[("alice".to_string(), json!({ "message": "hello" }))]
    );
}

#[tokio::test]
async fn multi_line_data_is_joined() {
    let (service, session) = start().await;
    session.connect(UserId::new("alice")).await.unwrap();
    until(&session, |s| s.status.is_connected()).await;

    service.push("alice", "{\"content\":\n\"split across lines\"}").await;
    until(&session, |s| has_text(s, "split across lines")).await;
}

#[tokio::test]
async fn rejected_send_becomes_system_message() {
    let (service, session) = start().await;
    session.connect(UserId::new("alice")).await.unwrap();
    until(&session, |s| s.status.is_connected()).await;

    service.reject.store(true, Ordering::SeqCst);
    session.send("are you there?").await.unwrap();

    let snap = until(&session, |s| {
        s.messages.last().is_some_and(|m| {
            m.sender == Sender::System && m.content.to_string().contains("assistant busy")
        })
    })
    .await;
    assert!(!snap.responding);
    assert!(snap.status.is_connected());
}

#[tokio::test]
async fn ended_stream_reconnects() {
    let (service, session) = start().await;
    session.connect(UserId::new("alice")).await.unwrap();
    until(&session, |s| s.status.is_connected()).await;
    assert_eq!(service.opens.load(Ordering::SeqCst), 1);

    service.end_stream("alice");
    let snap = until(&session, |s| {
        s.status.is_connected() && service.opens.load(Ordering::SeqCst) == 2
    })
    .await;
    assert_eq!(snap.status.attempts(), 0);

    service.push("alice", r#"{"content":"back again"}"#).await;
    until(&session, |s| has_text(s, "back again")).await;
}
