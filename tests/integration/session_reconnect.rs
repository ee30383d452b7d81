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

//! Reconnection behaviour of `ChatSession` over the loopback backend.
//!
//! Every test runs on tokio's paused clock, so backoff delays are exact
//! and the suite finishes instantly. The loopback server decides each
//! connect attempt (accept or refuse), which makes retry sequences fully
//! scripted.

use std::time::Duration;

use boardroom::session::{ChatSession, ConnectionState, SessionConfig, SessionSnapshot};
use boardroom::transport::UserId;
use boardroom::transport::loopback::{LoopbackPeer, LoopbackServer, LoopbackTransport};
use tokio::time::Instant;

const WAIT: Duration = Duration::from_secs(600);

fn spawn() -> (ChatSession, LoopbackServer) {
    let (transport, server) = LoopbackTransport::pair();
    let (session, _events) = ChatSession::spawn(transport, SessionConfig::default());
    (session, server)
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

async fn connect(session: &ChatSession, server: &mut LoopbackServer, user: &str) -> LoopbackPeer {
    session.connect(UserId::new(user)).await.unwrap();
    let peer = server.next_attempt().await.unwrap().accept();
    until(session, |s| s.status.is_connected()).await;
    peer
}

/// Refuse the next attempt and report how long after `since` it arrived.
async fn refuse_next(server: &mut LoopbackServer, since: Instant) -> Duration {
    let attempt = tokio::time::timeout(WAIT, server.next_attempt())
        .await
        .expect("no connect attempt")
        .unwrap();
    let elapsed = since.elapsed();
    attempt.refuse("service unavailable");
    elapsed
}

fn assert_close(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(100),
        "expected ~{expected:?}, got {actual:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn fresh_connection_has_clean_status() {
    let (session, mut server) = spawn();
    let _peer = connect(&session, &mut server, "alice").await;

    let snap = session.snapshot();
    assert_eq!(snap.status.state(), ConnectionState::Connected);
    assert_eq!(snap.status.attempts(), 0);
    assert!(snap.status.last_error().is_none());
    assert_eq!(snap.user, Some(UserId::new("alice")));
}

#[tokio::test(start_paused = true)]
async fn drop_backs_off_exponentially_then_gives_up() {
    let (session, mut server) = spawn();
    let peer = connect(&session, &mut server, "alice").await;

    peer.drop_connection("server restart").await;
    let snap = until(&session, |s| s.status.attempts() == 1).await;
    assert_eq!(snap.status.state(), ConnectionState::Disconnected);
    assert_eq!(
        snap.status.last_error(),
        Some("Connection lost (server restart). Reconnecting in 3s (attempt 1/3)")
    );

    let mut since = Instant::now();
    for (attempt, delay) in [(1, 3), (2, 6), (3, 12)] {
        let elapsed = refuse_next(&mut server, since).await;
        assert_close(elapsed, Duration::from_secs(delay));
        since = Instant::now();
        if attempt < 3 {
            until(&session, |s| s.status.attempts() == attempt + 1).await;
        }
    }

    let snap = until(&session, |s| {
        s.status
            .last_error()
            .is_some_and(|e| e.starts_with("Connection lost after 3 attempts"))
    })
    .await;
    assert_eq!(snap.status.state(), ConnectionState::Disconnected);
    assert_eq!(snap.status.attempts(), 3);

    // No automatic attempt after the budget is spent.
    assert!(
        tokio::time::timeout(Duration::from_secs(300), server.next_attempt())
            .await
            .is_err()
    );
}

#[tokio::test(start_paused = true)]
async fn successful_retry_resets_counter() {
    let (session, mut server) = spawn();
    let peer = connect(&session, &mut server, "alice").await;

    peer.drop_connection("network blip").await;
    refuse_next(&mut server, Instant::now()).await;
    until(&session, |s| s.status.attempts() == 2).await;

    let _peer = server.next_attempt().await.unwrap().accept();
    let snap = until(&session, |s| s.status.is_connected()).await;
    assert_eq!(snap.status.attempts(), 0);
    assert!(snap.status.last_error().is_none());
}

#[tokio::test(start_paused = true)]
async fn manual_reconnect_after_exhaustion_resets_budget() {
    let (session, mut server) = spawn();
    session.connect(UserId::new("alice")).await.unwrap();

    // Initial failure plus three retries.
    for _ in 0..4 {
        refuse_next(&mut server, Instant::now()).await;
    }
    until(&session, |s| {
        s.status.attempts() == 3
            && s.status.state() == ConnectionState::Disconnected
            && s.status.last_error().is_some_and(|e| e.contains("after 3"))
    })
    .await;

    session.reconnect().await.unwrap();
    let snap = session.snapshot();
    assert_eq!(snap.status.state(), ConnectionState::Connecting);
    assert_eq!(snap.status.attempts(), 0);
    assert!(snap.status.last_error().is_none());

    // A fresh budget means the first retry is back to the base delay.
    refuse_next(&mut server, Instant::now()).await;
    let snap = until(&session, |s| s.status.attempts() == 1).await;
    assert!(snap.status.last_error().unwrap().contains("Reconnecting in 3s"));
}

#[tokio::test(start_paused = true)]
async fn manual_reconnect_cancels_pending_retry() {
    let (session, mut server) = spawn();
    let peer = connect(&session, &mut server, "alice").await;

    peer.drop_connection("gone").await;
    until(&session, |s| s.status.attempts() == 1).await;

    session.reconnect().await.unwrap();
    let _peer = server.next_attempt().await.unwrap().accept();
    until(&session, |s| s.status.is_connected()).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(server.try_next_attempt().is_none());
    assert!(session.snapshot().status.is_connected());
}

#[tokio::test(start_paused = true)]
async fn manual_reconnect_while_connected_replaces_link() {
    let (session, mut server) = spawn();
    let old = connect(&session, &mut server, "alice").await;

    session.reconnect().await.unwrap();
    let new = server.next_attempt().await.unwrap().accept();
    until(&session, |s| s.status.is_connected()).await;
    assert!(old.is_closed());

    // Whatever the superseded connection does now is ignored.
    let before = session.snapshot().messages.len();
    old.push_frame(r#"{"content":"from the past"}"#).await;
    old.drop_connection("late close").await;
    tokio::time::sleep(Duration::from_secs(30)).await;

    let snap = session.snapshot();
    assert!(snap.status.is_connected());
    assert_eq!(snap.status.attempts(), 0);
    assert_eq!(snap.messages.len(), before);
    assert!(server.try_next_attempt().is_none());

    new.push_frame(r#"{"content":"current"}"#).await;
    until(&session, |s| s.messages.len() == before + 1).await;
}

#[tokio::test(start_paused = true)]
async fn switching_identity_clears_log_and_ignores_old_connection() {
    let (session, mut server) = spawn();
    let alice = connect(&session, &mut server, "alice").await;
    alice.push_frame(r#"{"content":"hi alice"}"#).await;
    until(&session, |s| s.messages.len() == 2).await;

    session.switch_user(UserId::new("bob")).await.unwrap();
    let attempt = server.next_attempt().await.unwrap();
    assert_eq!(attempt.user(), &UserId::new("bob"));
    assert!(alice.is_closed());

    let snap = session.snapshot();
    assert!(snap.messages.is_empty());
    assert_eq!(snap.user, Some(UserId::new("bob")));
    assert_eq!(snap.status.state(), ConnectionState::Connecting);

    alice.push_frame(r#"{"content":"stale"}"#).await;
    let bob = attempt.accept();
    bob.push_frame(r#"{"content":"hi bob"}"#).await;

    let snap = until(&session, |s| {
        s.messages
            .last()
            .is_some_and(|m| m.content.as_text() == Some("hi bob"))
    })
    .await;
    assert!(snap.status.is_connected());
    assert!(
        snap.messages
            .iter()
            .all(|m| m.content.as_text() != Some("stale"))
    );
    assert!(
        snap.messages
            .iter()
            .any(|m| m.content.to_string().contains("as bob"))
    );
}

#[tokio::test(start_paused = true)]
async fn attempt_answered_after_switch_is_discarded() {
    let (session, mut server) = spawn();
    session.connect(UserId::new("alice")).await.unwrap();
    let stale = server.next_attempt().await.unwrap();

    session.switch_user(UserId::new("bob")).await.unwrap();
    let bob = server.next_attempt().await.unwrap();

    // The alice attempt resolves after the switch; nobody is listening.
    let stale_peer = stale.accept();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(stale_peer.is_closed());
    assert!(!stale_peer.push_frame(r#"{"content":"stale"}"#).await);
    assert_eq!(session.state(), ConnectionState::Connecting);

    let _bob = bob.accept();
    let snap = until(&session, |s| s.status.is_connected()).await;
    assert_eq!(snap.user, Some(UserId::new("bob")));
}

#[tokio::test(start_paused = true)]
async fn switching_identity_during_backoff_cancels_retry() {
    let (session, mut server) = spawn();
    let alice = connect(&session, &mut server, "alice").await;
    alice.drop_connection("gone").await;
    until(&session, |s| s.status.attempts() == 1).await;

    session.switch_user(UserId::new("bob")).await.unwrap();
    let attempt = server.next_attempt().await.unwrap();
    assert_eq!(attempt.user(), &UserId::new("bob"));
    assert_eq!(session.snapshot().status.attempts(), 0);
    let _bob = attempt.accept();
    until(&session, |s| s.status.is_connected()).await;

    // The alice retry timer would have fired by now.
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(server.try_next_attempt().is_none());
}
