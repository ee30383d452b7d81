//! Transport layer abstraction for `Boardroom` chat.
//!
//! Defines the [`Transport`] and [`Link`] traits the chat session drives.
//! Concrete implementations:
//! - [`websocket::WebSocketTransport`]: full duplex, sends over the socket
//! - [`sse::SseTransport`]: server-sent event stream in, HTTP requests out
//! - [`loopback::LoopbackTransport`]: in-process scripted backend for tests
//!
//! Backends only move text. Frame decoding, reconnection and backoff live
//! in [`crate::session`] and are shared by every backend.

pub mod loopback;
pub mod sse;
pub mod websocket;

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;

/// Identity the chat stream is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    /// Creates a user identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which backend carries the chat.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// WebSocket, full duplex.
    #[default]
    #[value(name = "websocket")]
    WebSocket,
    /// Server-sent events plus HTTP requests.
    #[value(name = "sse")]
    Sse,
    /// In-process loopback for testing.
    #[value(skip)]
    #[serde(skip)]
    Loopback,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebSocket => write!(f, "WebSocket"),
            Self::Sse => write!(f, "SSE"),
            Self::Loopback => write!(f, "Loopback"),
        }
    }
}

/// Errors that can occur during transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection has been closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// The operation timed out before completing.
    #[error("transport operation timed out")]
    Timeout,

    /// The service refused the connection.
    #[error("connection refused: {0}")]
    Refused(String),

    /// The service rejected an outbound message.
    #[error("message rejected: {0}")]
    Rejected(String),

    /// The service spoke something other than the expected protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An underlying I/O error occurred.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Something that happened on an open stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// A text frame (JSON, not yet decoded).
    Frame(String),
    /// The stream ended, with a reason when one is known.
    Closed(Option<String>),
}

/// Receiving half of an open stream. The channel ending also means closed.
pub type Inbound = mpsc::Receiver<InboundEvent>;

/// Channel capacity for inbound frames on every backend.
pub(crate) const INBOUND_BUFFER: usize = 256;

/// A streaming connection factory.
///
/// A successful [`Transport::connect`] is the "open" event: the stream is
/// established and frames may start arriving on the returned [`Inbound`].
pub trait Transport: Send + Sync + 'static {
    /// Outbound half of an open connection.
    type Link: Link;

    /// Open a stream scoped to `user`.
    fn connect(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<(Self::Link, Inbound), TransportError>> + Send;

    /// Return the kind of this transport.
    fn kind(&self) -> TransportKind;
}

/// Outbound half of an open connection.
pub trait Link: Send + Sync + 'static {
    /// Send one user message.
    ///
    /// Resolves once the backend has accepted the message. Replies arrive
    /// independently on the inbound stream, possibly before this resolves.
    fn send(&self, text: &str) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Tear the connection down. Idempotent; no further inbound events are
    /// delivered after this returns.
    fn close(&self);
}

/// Appends `segments` to the path of `base`.
pub(crate) fn endpoint(
    base: &url::Url,
    segments: &[&str],
) -> Result<url::Url, TransportError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| TransportError::Protocol(format!("{base} cannot be a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Parses a service base URL.
pub(crate) fn parse_base(base_url: &str) -> Result<url::Url, TransportError> {
    url::Url::parse(base_url)
        .map_err(|e| TransportError::Protocol(format!("invalid base URL {base_url}: {e}")))
}
