//! Chat message model and the append-only message log.
//!
//! Messages come from three places: frames pushed by the assistant
//! service, text the user sends, and notices the client generates itself
//! (connection announcements, send failures, task acknowledgements).
//! All of them land in one [`MessageLog`] in arrival order.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use boardroom_proto::frame::{self, ControlKind, MessageContent, Sender};

/// Unique identifier for a chat message (UUID v7, time-ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Creates a new time-ordered message identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message as shown in the chat panel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Unique identifier.
    pub id: MessageId,
    /// Author.
    pub sender: Sender,
    /// Body.
    pub content: MessageContent,
    /// When the message was authored (service time if provided).
    pub timestamp: DateTime<Utc>,
}

/// Result of decoding one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// A control frame; consumed, never shown.
    Control(ControlKind),
    /// A frame that becomes a chat message.
    Message(ChatMessage),
    /// A frame that could not be decoded, rendered as a system message
    /// holding the raw text.
    Raw(ChatMessage),
}

impl ChatMessage {
    /// Creates a message stamped with the current time.
    pub fn new(sender: Sender, content: MessageContent) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            content,
            timestamp: Utc::now(),
        }
    }

    /// A text message from the user.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, MessageContent::text(text))
    }

    /// A text message from the assistant.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, MessageContent::text(text))
    }

    /// A system notice.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Sender::System, MessageContent::text(text))
    }

    /// Decodes a raw inbound frame.
    ///
    /// Control frames are recognized and returned as such. Malformed JSON
    /// and frames without content are never dropped: they come back as
    /// [`Decoded::Raw`] system messages carrying the original text.
    #[must_use]
    pub fn from_frame(text: &str) -> Decoded {
        let parsed = match frame::decode_inbound(text) {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(err = %e, "undecodable chat frame");
                return Decoded::Raw(Self::system(text.to_string()));
            }
        };

        if let Some(kind) = parsed.control() {
            return Decoded::Control(kind);
        }

        let sender = parsed.sender();
        let timestamp = parsed
            .timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map_or_else(Utc::now, |ts| ts.with_timezone(&Utc));

        match parsed.content {
            Some(content) => Decoded::Message(Self {
                id: MessageId::new(),
                sender,
                content,
                timestamp,
            }),
            None => {
                tracing::warn!("chat frame without content");
                Decoded::Raw(Self::system(text.to_string()))
            }
        }
    }
}

impl fmt::Display for ChatMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.timestamp.with_timezone(&chrono::Local).format("%H:%M");
        match &self.content {
            MessageContent::Text(text) => write!(f, "[{time}] {}: {text}", self.sender),
            tasks @ MessageContent::Tasks(_) => {
                writeln!(f, "[{time}] {}:", self.sender)?;
                write!(f, "{tasks}")
            }
        }
    }
}

/// Append-only chat history.
///
/// Display order is arrival order. Entries are never reordered or
/// deduplicated; the only way to remove them is [`MessageLog::clear`],
/// used when the session switches to another identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
}

impl MessageLog {
    /// Creates an empty log.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            messages: Vec::new(),
        }
    }

    /// Appends a message.
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Drops every message.
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Messages in display order.
    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    /// Messages as a slice.
    #[must_use]
    pub fn as_slice(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The most recent message.
    #[must_use]
    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}
