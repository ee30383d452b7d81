//! JSON frames exchanged with the remote assistant service.
//!
//! Inbound frames arrive over either streaming backend (WebSocket text
//! frames or SSE `data:` payloads) and share one envelope:
//!
//! ```json
//! {"content": "...", "sender": "ai", "type": "message", "timestamp": "2026-01-01T10:00:00Z"}
//! ```
//!
//! `content` may also be a list of task summaries. Outbound messages are
//! `{"message": "..."}` on both backends; the request/stream-split backend
//! answers each send with a [`SendAck`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::task::TaskSummary;

/// Errors from encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload was not valid JSON for the expected shape.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The local person typing into the client.
    User,
    /// The remote assistant.
    Assistant,
    /// Connection notices and errors.
    System,
}

impl Sender {
    /// Maps a wire sender name to a [`Sender`].
    ///
    /// `"ai"` and `"assistant"` are both the assistant. Unknown names fall
    /// back to the assistant, matching the default for a missing field.
    #[must_use]
    pub fn from_wire(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "user" => Self::User,
            "system" => Self::System,
            _ => Self::Assistant,
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "you"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// Body of a chat message: plain text or a structured task list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text.
    Text(String),
    /// A list of task summaries.
    Tasks(Vec<TaskSummary>),
}

impl MessageContent {
    /// Builds text content.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// Returns the text if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Tasks(_) => None,
        }
    }
}

impl fmt::Display for MessageContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{text}"),
            Self::Tasks(tasks) if tasks.is_empty() => write!(f, "(no tasks)"),
            Self::Tasks(tasks) => {
                for (i, task) in tasks.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "  - {task}")?;
                }
                Ok(())
            }
        }
    }
}

/// Control frame kinds, consumed by the session and never shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    /// Server acknowledged the connection.
    ConnectionAck,
    /// Keepalive.
    Heartbeat,
}

/// An inbound frame as received from the service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InboundFrame {
    /// Message body. Absent on most control frames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    /// Wire sender name; defaults to the assistant.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    /// Frame type (`message`, `connection_ack`, `heartbeat`, ...).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// RFC 3339 timestamp assigned by the service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl InboundFrame {
    /// Returns the control kind if this frame is a control frame.
    #[must_use]
    pub fn control(&self) -> Option<ControlKind> {
        match self.kind.as_deref()?.to_ascii_lowercase().as_str() {
            "connection_ack" | "connected" => Some(ControlKind::ConnectionAck),
            "heartbeat" | "ping" | "pong" => Some(ControlKind::Heartbeat),
            _ => None,
        }
    }

    /// Resolved sender, defaulting to the assistant.
    #[must_use]
    pub fn sender(&self) -> Sender {
        self.sender.as_deref().map_or(Sender::Assistant, Sender::from_wire)
    }
}

/// Outbound chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    /// Text typed by the user.
    pub message: String,
}

/// Response to an outbound request on the request/stream-split backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendAck {
    /// Whether the service accepted the message.
    pub success: bool,
    /// Reason for rejection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Decodes an inbound frame from JSON text.
///
/// # Errors
///
/// Returns [`FrameError::Malformed`] if the text is not a JSON object of
/// the expected shape.
pub fn decode_inbound(text: &str) -> Result<InboundFrame, FrameError> {
    Ok(serde_json::from_str(text)?)
}

/// Encodes any frame type as JSON text.
///
/// # Errors
///
/// Returns [`FrameError::Malformed`] if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<String, FrameError> {
    Ok(serde_json::to_string(value)?)
}
