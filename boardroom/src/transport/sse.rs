//! Request/stream-split transport: server-sent events in, HTTP out.
//!
//! The stream is `GET {base}/events/{user}` with
//! `Accept: text/event-stream`; each event's `data:` lines are joined and
//! forwarded as one frame. Messages are posted separately to
//! `POST {base}/chat/{user}` as `{"message": "..."}` and answered with a
//! [`SendAck`]. Replies come back on the stream, so they may arrive before
//! or after the POST resolves, or not at all.

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, CACHE_CONTROL};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use url::Url;

use boardroom_proto::frame::{OutboundMessage, SendAck};

use super::{
    INBOUND_BUFFER, Inbound, InboundEvent, Link, Transport, TransportError, TransportKind, UserId,
    endpoint, parse_base,
};

/// Incremental splitter for a `text/event-stream` body.
///
/// Bytes are buffered raw and only complete event blocks are decoded, so a
/// multi-byte character split across network chunks survives intact.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buffer: Vec<u8>,
}

impl SseBuffer {
    #[must_use]
    pub const fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    pub fn push_chunk(&mut self, chunk: &[u8]) {
        // 0x0D never occurs inside a multi-byte UTF-8 sequence.
        self.buffer.extend(chunk.iter().copied().filter(|&byte| byte != b'\r'));
    }

    /// Removes and returns the next complete event block, if any.
    pub fn next_event_block(&mut self) -> Option<String> {
        let boundary = self.buffer.windows(2).position(|pair| pair == b"\n\n")?;
        let remaining = self.buffer.split_off(boundary + 2);
        let event_block = std::mem::replace(&mut self.buffer, remaining);
        Some(String::from_utf8(event_block).unwrap_or_else(|e| {
            tracing::warn!(err = %e, "event block is not valid UTF-8");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }))
    }
}

/// Joins the `data:` lines of one event block. `None` when the block
/// carries no data (comments, bare `event:` or `id:` lines).
#[must_use]
pub fn event_data(event_block: &str) -> Option<String> {
    let lines: Vec<&str> = event_block
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data))
        .collect();
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// SSE + HTTP transport implementing the [`Transport`] trait.
#[derive(Debug, Clone)]
pub struct SseTransport {
    base: Url,
    client: reqwest::Client,
}

/// Outbound half of an SSE connection.
pub struct SseLink {
    client: reqwest::Client,
    chat_url: Url,
    reader: AbortHandle,
}

impl SseTransport {
    /// Creates a transport for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Protocol`] for unparsable URLs.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Ok(Self {
            base: parse_base(base_url)?,
            client: reqwest::Client::new(),
        })
    }

    /// The event stream URL for a user.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Protocol`] if the base URL cannot take
    /// path segments.
    pub fn events_url(&self, user: &UserId) -> Result<Url, TransportError> {
        endpoint(&self.base, &["events", user.as_str()])
    }

    /// The message request URL for a user.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Protocol`] if the base URL cannot take
    /// path segments.
    pub fn chat_url(&self, user: &UserId) -> Result<Url, TransportError> {
        endpoint(&self.base, &["chat", user.as_str()])
    }
}

impl Transport for SseTransport {
    type Link = SseLink;

    async fn connect(&self, user: &UserId) -> Result<(SseLink, Inbound), TransportError> {
        let events_url = self.events_url(user)?;
        let chat_url = self.chat_url(user)?;

        let response = self
            .client
            .get(events_url.clone())
            .header(ACCEPT, "text/event-stream")
            .header(CACHE_CONTROL, "no-cache")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %events_url, err = %e, "event stream request failed");
                map_reqwest_error(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %events_url, %status, "event stream refused");
            return Err(TransportError::Refused(format!("HTTP status {status}")));
        }

        let (tx, rx) = mpsc::channel(INBOUND_BUFFER);
        let reader = tokio::spawn(reader_loop(response, tx));

        tracing::info!(url = %events_url, user = %user, "event stream open");

        Ok((
            SseLink {
                client: self.client.clone(),
                chat_url,
                reader: reader.abort_handle(),
            },
            rx,
        ))
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Sse
    }
}

impl Link for SseLink {
    async fn send(&self, text: &str) -> Result<(), TransportError> {
        if self.reader.is_finished() {
            return Err(TransportError::ConnectionClosed);
        }
        let response = self
            .client
            .post(self.chat_url.clone())
            .json(&OutboundMessage {
                message: text.to_string(),
            })
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(url = %self.chat_url, err = %e, "chat request failed");
                map_reqwest_error(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected(format!("HTTP status {status}")));
        }

        let ack: SendAck = response
            .json()
            .await
            .map_err(|e| TransportError::Protocol(format!("bad chat response: {e}")))?;
        if ack.success {
            Ok(())
        } else {
            Err(TransportError::Rejected(
                ack.error.unwrap_or_else(|| "request rejected".to_string()),
            ))
        }
    }

    fn close(&self) {
        self.reader.abort();
    }
}

impl Drop for SseLink {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Background task that splits the event stream into frames.
async fn reader_loop(response: reqwest::Response, tx: mpsc::Sender<InboundEvent>) {
    let mut byte_stream = response.bytes_stream();
    let mut sse_buffer = SseBuffer::new();

    let reason = loop {
        match byte_stream.next().await {
            Some(Ok(chunk)) => {
                sse_buffer.push_chunk(&chunk);
                while let Some(block) = sse_buffer.next_event_block() {
                    let Some(data) = event_data(&block) else {
                        continue;
                    };
                    if tx.send(InboundEvent::Frame(data)).await.is_err() {
                        return;
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!(err = %e, "event stream read error");
                break Some(e.to_string());
            }
            None => break Some("event stream ended".to_string()),
        }
    };
    let _ = tx.send(InboundEvent::Closed(reason)).await;
    tracing::debug!("event stream reader task exiting");
}

fn map_reqwest_error(err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Refused(err.to_string())
    } else {
        TransportError::Io(std::io::Error::other(err.to_string()))
    }
}
