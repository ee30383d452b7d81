//! Connection state machine and reconnect policy.
//!
//! Pure values with no I/O: [`super::ChatSession`] drives these
//! transitions and performs whatever they ask for (schedule a retry,
//! stop retrying). Every backend shares this one implementation.

use std::fmt;
use std::time::Duration;

/// Lifecycle state of the chat connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No connection. Initial state, and terminal once retries run out.
    #[default]
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// The stream is open.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Exponential backoff for automatic reconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before the first automatic retry.
    pub base_delay: Duration,
    /// Automatic retries allowed before giving up.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(3),
            max_attempts: 3,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (zero-based):
    /// `base_delay * 2^attempt`, saturating.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// What to do after the connection was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// Schedule automatic retry number `attempt` (one-based) after `delay`.
    Retry {
        /// Retry number, counting from one.
        attempt: u32,
        /// How long to wait first.
        delay: Duration,
    },
    /// The retry budget is spent; wait for a manual reconnect.
    Exhausted,
}

/// Connection state plus the retry bookkeeping that goes with it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionStatus {
    state: ConnectionState,
    attempts: u32,
    last_error: Option<String>,
}

impl ConnectionStatus {
    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Automatic retries used since the last successful open.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Human-readable reason for the last failure.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether the stream is open.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// A connection attempt starts. The retry counter is kept.
    pub fn begin_connect(&mut self) {
        self.state = ConnectionState::Connecting;
    }

    /// A user-triggered reconnect: fresh retry budget, then connect.
    pub fn manual_reconnect(&mut self) {
        self.attempts = 0;
        self.last_error = None;
        self.begin_connect();
    }

    /// The stream opened: counter and error reset.
    pub fn opened(&mut self) {
        self.state = ConnectionState::Connected;
        self.attempts = 0;
        self.last_error = None;
    }

    /// The connection failed or dropped.
    ///
    /// Moves to [`ConnectionState::Disconnected`], records a user-facing
    /// message and decides whether another automatic attempt is allowed.
    pub fn lost(&mut self, reason: &str, policy: &ReconnectPolicy) -> Recovery {
        self.state = ConnectionState::Disconnected;

        if self.attempts < policy.max_attempts {
            let delay = policy.delay_for(self.attempts);
            self.attempts += 1;
            self.last_error = Some(format!(
                "Connection lost ({reason}). Reconnecting in {}s (attempt {}/{})",
                delay.as_secs(),
                self.attempts,
                policy.max_attempts
            ));
            Recovery::Retry {
                attempt: self.attempts,
                delay,
            }
        } else {
            self.last_error = Some(format!(
                "Connection lost after {} attempts ({reason}). Use reconnect to try again.",
                policy.max_attempts
            ));
            Recovery::Exhausted
        }
    }

    /// Back to the initial state (identity switch, shutdown).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
