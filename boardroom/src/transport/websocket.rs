//! Full-duplex WebSocket transport.
//!
//! Opens `ws(s)://{base}/ws/{user}`. Inbound text frames are forwarded
//! untouched; user messages go out as `{"message": "..."}` text frames on
//! the same socket. A background reader task owns the read half and is
//! aborted when the link is closed or dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Mutex, mpsc};
use tokio::task::AbortHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use boardroom_proto::frame::{self, OutboundMessage};

use super::{
    INBOUND_BUFFER, Inbound, InboundEvent, Link, Transport, TransportError, TransportKind, UserId,
    endpoint, parse_base,
};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Type alias for the write half of a WebSocket connection.
type WsSender = futures_util::stream::SplitSink<WsStream, Message>;

/// Type alias for the read half of a WebSocket connection.
type WsReader = futures_util::stream::SplitStream<WsStream>;

/// WebSocket transport implementing the [`Transport`] trait.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    base: Url,
}

/// Outbound half of an open WebSocket.
pub struct WebSocketLink {
    /// Write half, shared so concurrent sends serialize.
    sender: Arc<Mutex<WsSender>>,
    /// Background reader task.
    reader: AbortHandle,
    closed: AtomicBool,
}

impl WebSocketTransport {
    /// Creates a transport for the service at `base_url`.
    ///
    /// `http`/`https` bases are mapped to `ws`/`wss`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Protocol`] for unparsable URLs or schemes
    /// other than `http`, `https`, `ws` and `wss`.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let mut base = parse_base(base_url)?;
        let scheme = match base.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(TransportError::Protocol(format!(
                    "unsupported scheme for WebSocket: {other}"
                )));
            }
        };
        base.set_scheme(scheme)
            .map_err(|()| TransportError::Protocol(format!("cannot use {scheme} for {base_url}")))?;
        Ok(Self { base })
    }

    /// The stream URL for a user.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Protocol`] if the base URL cannot take
    /// path segments.
    pub fn stream_url(&self, user: &UserId) -> Result<Url, TransportError> {
        endpoint(&self.base, &["ws", user.as_str()])
    }
}

impl Transport for WebSocketTransport {
    type Link = WebSocketLink;

    async fn connect(&self, user: &UserId) -> Result<(WebSocketLink, Inbound), TransportError> {
        let url = self.stream_url(user)?;
        let (ws_stream, _response) = connect_async(url.as_str()).await.map_err(|e| {
            tracing::warn!(url = %url, err = %e, "WebSocket connect failed");
            map_ws_connect_error(e)
        })?;

        let (ws_sender, ws_reader) = ws_stream.split();
        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        let reader = tokio::spawn(reader_loop(ws_reader, tx));

        tracing::info!(url = %url, user = %user, "WebSocket open");

        Ok((
            WebSocketLink {
                sender: Arc::new(Mutex::new(ws_sender)),
                reader: reader.abort_handle(),
                closed: AtomicBool::new(false),
            },
            rx,
        ))
    }

    fn kind(&self) -> TransportKind {
        TransportKind::WebSocket
    }
}

impl Link for WebSocketLink {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        if self.closed.load(Ordering::Relaxed) {
            return Err(TransportError::ConnectionClosed);
        }
        let payload = frame::encode(&OutboundMessage {
            message: text.to_string(),
        })
        .map_err(|e| TransportError::Protocol(e.to_string()))?;

        let mut sender = self.sender.lock().await;
        sender
            .send(Message::Text(payload.into()))
            .await
            .map_err(|e| {
                tracing::warn!(err = %e, "WebSocket send failed");
                TransportError::ConnectionClosed
            })
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::Relaxed) {
            return;
        }
        self.reader.abort();
        let sender = Arc::clone(&self.sender);
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                let _ = sender.lock().await.close().await;
            });
        }
    }
}

impl Drop for WebSocketLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Background task that reads WebSocket messages and forwards text frames.
///
/// Binary frames holding UTF-8 are forwarded as text; anything else is
/// skipped. Ends with a single [`InboundEvent::Closed`].
async fn reader_loop(mut ws_reader: WsReader, tx: mpsc::Sender<InboundEvent>) {
    let reason = loop {
        match ws_reader.next().await {
            Some(Ok(Message::Text(text))) => {
                if tx.send(InboundEvent::Frame(text.as_str().to_owned())).await.is_err() {
                    // Receiver dropped; the session moved on.
                    return;
                }
            }
            Some(Ok(Message::Binary(data))) => match String::from_utf8(data.to_vec()) {
                Ok(text) => {
                    if tx.send(InboundEvent::Frame(text)).await.is_err() {
                        return;
                    }
                }
                Err(_) => tracing::warn!(len = data.len(), "non-UTF-8 binary frame, skipping"),
            },
            Some(Ok(Message::Close(frame))) => {
                tracing::info!("WebSocket closed by server");
                break Some(
                    frame
                        .map(|f| f.reason.as_str().to_owned())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by server".to_string()),
                );
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
            Some(Err(e)) => {
                tracing::warn!(err = %e, "WebSocket read error");
                break Some(e.to_string());
            }
            None => break None,
        }
    };
    let _ = tx.send(InboundEvent::Closed(reason)).await;
    tracing::debug!("WebSocket reader task exiting");
}

/// Map a `tokio_tungstenite` connection error to a [`TransportError`].
fn map_ws_connect_error(err: tokio_tungstenite::tungstenite::Error) -> TransportError {
    use tokio_tungstenite::tungstenite::Error as WsError;
    match err {
        WsError::Io(io_err) => {
            if io_err.kind() == std::io::ErrorKind::ConnectionRefused
                || io_err.kind() == std::io::ErrorKind::AddrNotAvailable
            {
                TransportError::Refused(io_err.to_string())
            } else {
                TransportError::Io(io_err)
            }
        }
        WsError::Http(response) => {
            TransportError::Refused(format!("HTTP status {}", response.status()))
        }
        WsError::Tls(_) => TransportError::Io(std::io::Error::other(format!("TLS error: {err}"))),
        other => TransportError::Protocol(format!("WebSocket connect error: {other}")),
    }
}
