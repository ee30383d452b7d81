//! Loopback transport for testing.
//!
//! Uses in-process [`tokio::sync`] channels in place of a network. Every
//! connect attempt made through a [`LoopbackTransport`] surfaces on the
//! paired [`LoopbackServer`] as a [`PendingAttempt`], which the test
//! accepts or refuses. An accepted attempt yields a [`LoopbackPeer`] that
//! plays the remote service: it pushes frames, observes sends and can drop
//! the connection.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{mpsc, oneshot};

use super::{
    INBOUND_BUFFER, Inbound, InboundEvent, Link, Transport, TransportError, TransportKind, UserId,
};

type AttemptReply = oneshot::Sender<Result<(LoopbackLink, Inbound), TransportError>>;

/// Client side of the loopback pair.
#[derive(Clone)]
pub struct LoopbackTransport {
    attempts: mpsc::UnboundedSender<PendingAttempt>,
}

/// Test-controlled service side of the loopback pair.
pub struct LoopbackServer {
    attempts: mpsc::UnboundedReceiver<PendingAttempt>,
}

/// A connect attempt waiting for the server's decision.
pub struct PendingAttempt {
    user: UserId,
    reply: AttemptReply,
}

/// The service end of one accepted connection.
pub struct LoopbackPeer {
    user: UserId,
    frames: mpsc::Sender<InboundEvent>,
    sent: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

/// Outbound half handed to the session.
pub struct LoopbackLink {
    sent: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
    fail_sends: Arc<AtomicBool>,
}

impl LoopbackTransport {
    /// Create a connected transport/server pair.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// use boardroom::transport::loopback::LoopbackTransport;
    /// use boardroom::transport::{Transport, UserId};
    ///
    /// # async fn example() {
    /// let (transport, mut server) = LoopbackTransport::pair();
    /// let client = tokio::spawn(async move { transport.connect(&UserId::new("alice")).await });
    /// let peer = server.next_attempt().await.unwrap().accept();
    /// peer.push_frame(r#"{"content":"hi"}"#).await;
    /// # }
    /// ```
    #[must_use]
    pub fn pair() -> (Self, LoopbackServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { attempts: tx }, LoopbackServer { attempts: rx })
    }
}

impl Transport for LoopbackTransport {
    type Link = LoopbackLink;

    async fn connect(&self, user: &UserId) -> Result<(LoopbackLink, Inbound), TransportError> {
        let (reply, decision) = oneshot::channel();
        self.attempts
            .send(PendingAttempt {
                user: user.clone(),
                reply,
            })
            .map_err(|_| TransportError::Refused("loopback server is gone".to_string()))?;
        decision
            .await
            .map_err(|_| TransportError::Refused("attempt dropped".to_string()))?
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Loopback
    }
}

impl LoopbackServer {
    /// Wait for the next connect attempt. `None` once the transport and
    /// every clone of it are dropped.
    pub async fn next_attempt(&mut self) -> Option<PendingAttempt> {
        self.attempts.recv().await
    }

    /// Return a pending attempt without waiting, if there is one.
    pub fn try_next_attempt(&mut self) -> Option<PendingAttempt> {
        self.attempts.try_recv().ok()
    }
}

impl PendingAttempt {
    /// Identity the client asked for.
    #[must_use]
    pub const fn user(&self) -> &UserId {
        &self.user
    }

    /// Open the connection.
    #[must_use]
    pub fn accept(self) -> LoopbackPeer {
        let (frame_tx, frame_rx) = mpsc::channel(INBOUND_BUFFER);
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let fail_sends = Arc::new(AtomicBool::new(false));

        let link = LoopbackLink {
            sent: sent_tx,
            closed: Arc::clone(&closed),
            fail_sends: Arc::clone(&fail_sends),
        };
        // The client may have given up already; the peer then sees a closed link.
        let _ = self.reply.send(Ok((link, frame_rx)));

        LoopbackPeer {
            user: self.user,
            frames: frame_tx,
            sent: sent_rx,
            closed,
            fail_sends,
        }
    }

    /// Refuse the connection with a reason.
    pub fn refuse(self, reason: impl Into<String>) {
        let _ = self.reply.send(Err(TransportError::Refused(reason.into())));
    }
}

impl LoopbackPeer {
    /// Identity this connection is scoped to.
    #[must_use]
    pub const fn user(&self) -> &UserId {
        &self.user
    }

    /// Push a raw text frame. Returns `false` if the client side is gone.
    pub async fn push_frame(&self, text: impl Into<String>) -> bool {
        self.frames
            .send(InboundEvent::Frame(text.into()))
            .await
            .is_ok()
    }

    /// Wait for the next message the client sent.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.sent.recv().await
    }

    /// Make every following send fail.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::Relaxed);
    }

    /// Whether the client closed or dropped its link.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed) || self.frames.is_closed()
    }

    /// Drop the connection from the service side.
    pub async fn drop_connection(self, reason: impl Into<String>) {
        let _ = self
            .frames
            .send(InboundEvent::Closed(Some(reason.into())))
            .await;
    }
}

impl Link for LoopbackLink {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::ConnectionClosed);
        }
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(TransportError::Rejected("loopback send failure".to_string()));
        }
        self.sent
            .send(text.to_string())
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}

impl Drop for LoopbackLink {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Relaxed);
    }
}
