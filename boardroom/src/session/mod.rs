//! Chat Transport Manager.
//!
//! [`ChatSession`] owns the lifecycle of one streaming connection to the
//! assistant service over any [`Transport`] backend. All state lives in a
//! single background task (the session actor); the handle talks to it over
//! channels, in the same shape as the networking coordinator's
//! command/event split:
//!
//! ```text
//! UI  ── ChatSession methods ──►  session actor  ◄── connection tasks
//!     ◄──── SessionEvent ───────                 ◄── retry / indicator timers
//!     ◄──── watch<SessionSnapshot>
//! ```
//!
//! Every connection attempt gets a generation number. Connection tasks and
//! timers tag what they report with it, and the actor drops anything whose
//! generation is no longer current, so a superseded connection can never
//! change what the user sees. Retry timers, connection tasks and indicator
//! timers are aborted on manual reconnect, identity switch and shutdown.

pub mod state;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinHandle, JoinSet};

use crate::chat::{ChatMessage, Decoded, MessageLog};
use crate::transport::{InboundEvent, Link, Transport, TransportError, TransportKind, UserId};

pub use state::{ConnectionState, ConnectionStatus, ReconnectPolicy, Recovery};

/// Default capacity of the command and event channels.
const DEFAULT_EVENT_BUFFER: usize = 256;

/// Tuning knobs for a [`ChatSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Backoff shared by every backend.
    pub reconnect: ReconnectPolicy,
    /// Upper bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// How long the "assistant is responding" indicator stays up.
    pub responding_indicator: Duration,
    /// Capacity of the command and event channels.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
            responding_indicator: Duration::from_secs(1),
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }
}

/// Everything the UI renders from the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSnapshot {
    /// Identity the session is scoped to.
    pub user: Option<UserId>,
    /// Connection state, retry counter and last error.
    pub status: ConnectionStatus,
    /// Chat history.
    pub messages: MessageLog,
    /// Whether the "assistant is responding" indicator is shown.
    pub responding: bool,
}

/// Incremental notifications for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection state changed.
    StateChanged(ConnectionState),
    /// A message was appended to the log.
    Message(ChatMessage),
    /// The responding indicator was raised or cleared.
    Responding(bool),
    /// Something the user should see in an error banner.
    Error(String),
    /// The log was cleared (identity switch).
    Cleared,
}

/// Why a send was not performed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// Blank text.
    #[error("cannot send an empty message")]
    Empty,
    /// No open connection.
    #[error("not connected; message not sent")]
    NotConnected,
    /// The session task is gone.
    #[error("chat session has shut down")]
    SessionClosed,
}

/// Errors from session control calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// The session task is gone.
    #[error("chat session has shut down")]
    Closed,
    /// Reconnect was requested before any identity was chosen.
    #[error("no user selected")]
    NoUser,
}

enum Command {
    Connect(UserId),
    SwitchUser(UserId),
    Reconnect(oneshot::Sender<Result<(), SessionError>>),
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), SendError>>,
    },
    Notify(ChatMessage),
    Shutdown,
}

enum Internal<L> {
    Opened { generation: u64, link: Arc<L> },
    Frame { generation: u64, text: String },
    Closed { generation: u64, reason: String },
    RetryDue { generation: u64 },
    SendFailed { generation: u64, error: String },
    RespondingExpired { generation: u64 },
}

/// Handle to a running chat session.
pub struct ChatSession {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<SessionSnapshot>,
    kind: TransportKind,
    task: JoinHandle<()>,
}

impl ChatSession {
    /// Spawn the session actor for `transport`.
    ///
    /// The session starts disconnected; call [`ChatSession::connect`].
    /// The returned receiver carries [`SessionEvent`]s. If it is not
    /// drained, events beyond the buffer are dropped (the snapshot stays
    /// authoritative).
    pub fn spawn<T: Transport>(
        transport: T,
        config: SessionConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>) {
        let buffer = config.event_buffer.max(1);
        let (cmd_tx, cmd_rx) = mpsc::channel(buffer);
        let (evt_tx, evt_rx) = mpsc::channel(buffer);
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(SessionSnapshot::default());
        let kind = transport.kind();

        let actor = Actor {
            transport: Arc::new(transport),
            config,
            snapshot: snapshot_tx,
            events: evt_tx,
            internal_tx,
            generation: 0,
            active: None,
            retry: None,
            indicators: JoinSet::new(),
        };
        let task = tokio::spawn(actor.run(cmd_rx, internal_rx));

        (
            Self {
                commands: cmd_tx,
                snapshot: snapshot_rx,
                kind,
                task,
            },
            evt_rx,
        )
    }

    /// Connect as `user`, closing any current connection first.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has shut down.
    pub async fn connect(&self, user: UserId) -> Result<(), SessionError> {
        self.command(Command::Connect(user)).await
    }

    /// Switch to another identity: tear down, clear the log, connect.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has shut down.
    pub async fn switch_user(&self, user: UserId) -> Result<(), SessionError> {
        self.command(Command::SwitchUser(user)).await
    }

    /// Manual reconnect with a fresh retry budget. Valid in any state.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::NoUser`] before any identity was chosen, or
    /// [`SessionError::Closed`] if the session has shut down.
    pub async fn reconnect(&self) -> Result<(), SessionError> {
        let (reply, result) = oneshot::channel();
        self.command(Command::Reconnect(reply)).await?;
        result.await.map_err(|_| SessionError::Closed)?
    }

    /// Send a user message.
    ///
    /// On success the message is already in the log; delivery happens in
    /// the background and a failure shows up later as a system message.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Empty`] for blank text and
    /// [`SendError::NotConnected`] unless the connection is open. Nothing
    /// is sent or logged in either case.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), SendError> {
        let (reply, result) = oneshot::channel();
        self.commands
            .send(Command::Send {
                text: text.into(),
                reply,
            })
            .await
            .map_err(|_| SendError::SessionClosed)?;
        result.await.map_err(|_| SendError::SessionClosed)?
    }

    /// Append a locally generated message (for example a task
    /// acknowledgement) to the log.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has shut down.
    pub async fn notify(&self, message: ChatMessage) -> Result<(), SessionError> {
        self.command(Command::Notify(message)).await
    }

    /// Current state of the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().status.state()
    }

    /// A receiver that observes every snapshot change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.clone()
    }

    /// Wait until the snapshot satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session ends first.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&SessionSnapshot) -> bool,
    ) -> Result<SessionSnapshot, SessionError> {
        let mut rx = self.snapshot.clone();
        rx.wait_for(predicate)
            .await
            .map(|snapshot| snapshot.clone())
            .map_err(|_| SessionError::Closed)
    }

    /// Backend carrying this session.
    #[must_use]
    pub const fn transport_kind(&self) -> TransportKind {
        self.kind
    }

    /// Stop the session, closing the connection and cancelling timers.
    pub async fn shutdown(self) {
        let _ = self.commands.send(Command::Shutdown).await;
        if let Err(e) = self.task.await {
            tracing::warn!(err = %e, "chat session task failed");
        }
    }

    async fn command(&self, command: Command) -> Result<(), SessionError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

struct ActiveConnection<L> {
    generation: u64,
    task: JoinHandle<()>,
    link: Option<Arc<L>>,
}

struct Actor<T: Transport> {
    transport: Arc<T>,
    config: SessionConfig,
    snapshot: watch::Sender<SessionSnapshot>,
    events: mpsc::Sender<SessionEvent>,
    internal_tx: mpsc::UnboundedSender<Internal<T::Link>>,
    generation: u64,
    active: Option<ActiveConnection<T::Link>>,
    retry: Option<JoinHandle<()>>,
    indicators: JoinSet<()>,
}

impl<T: Transport> Actor<T> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut internal: mpsc::UnboundedReceiver<Internal<T::Link>>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle_command(command),
                },
                Some(event) = internal.recv() => self.handle_internal(event),
            }
        }

        self.teardown();
        self.snapshot.send_modify(|s| {
            s.status.reset();
            s.responding = false;
        });
        tracing::info!("chat session stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(user) => {
                self.snapshot.send_modify(|s| s.user = Some(user));
                self.open_connection();
            }
            Command::SwitchUser(user) => self.switch_user(user),
            Command::Reconnect(reply) => {
                let result = if self.snapshot.borrow().user.is_some() {
                    tracing::info!("manual reconnect");
                    self.cancel_retry();
                    self.snapshot.send_modify(|s| s.status.manual_reconnect());
                    self.open_connection();
                    Ok(())
                } else {
                    self.emit(SessionEvent::Error(SessionError::NoUser.to_string()));
                    Err(SessionError::NoUser)
                };
                let _ = reply.send(result);
            }
            Command::Send { text, reply } => {
                let result = self.send(text);
                if let Err(e) = &result {
                    self.emit(SessionEvent::Error(e.to_string()));
                }
                let _ = reply.send(result);
            }
            Command::Notify(message) => self.append(message),
            Command::Shutdown => {}
        }
    }

    fn handle_internal(&mut self, event: Internal<T::Link>) {
        match event {
            Internal::Opened { generation, link } => self.on_opened(generation, link),
            Internal::Frame { generation, text } => self.on_frame(generation, &text),
            Internal::Closed { generation, reason } => self.on_closed(generation, &reason),
            Internal::RetryDue { generation } => {
                if generation == self.generation && self.active.is_none() {
                    self.retry = None;
                    self.open_connection();
                }
            }
            Internal::SendFailed { generation, error } => {
                if generation != self.generation {
                    tracing::debug!(generation, "send failure from superseded connection dropped");
                    return;
                }
                tracing::warn!(err = %error, "message send failed");
                self.append(ChatMessage::system(format!("Failed to send message: {error}")));
                self.set_responding(false);
                self.emit(SessionEvent::Error(error));
            }
            Internal::RespondingExpired { generation } => {
                if generation == self.generation {
                    self.set_responding(false);
                }
            }
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.generation == generation)
    }

    fn open_connection(&mut self) {
        let Some(user) = self.snapshot.borrow().user.clone() else {
            return;
        };
        self.cancel_retry();
        self.close_active();

        self.generation += 1;
        let generation = self.generation;
        self.snapshot.send_modify(|s| s.status.begin_connect());
        self.emit(SessionEvent::StateChanged(ConnectionState::Connecting));

        tracing::info!(
            user = %user,
            generation,
            transport = %self.transport.kind(),
            "connecting"
        );

        let task = tokio::spawn(run_connection(
            Arc::clone(&self.transport),
            user,
            generation,
            self.config.connect_timeout,
            self.internal_tx.clone(),
        ));
        self.active = Some(ActiveConnection {
            generation,
            task,
            link: None,
        });
    }

    fn on_opened(&mut self, generation: u64, link: Arc<T::Link>) {
        let Some(active) = self.active.as_mut().filter(|a| a.generation == generation) else {
            tracing::debug!(generation, "superseded connection opened; closing it");
            link.close();
            return;
        };
        active.link = Some(link);

        let user = self.snapshot.borrow().user.clone();
        self.snapshot.send_modify(|s| s.status.opened());
        self.emit(SessionEvent::StateChanged(ConnectionState::Connected));
        tracing::info!(generation, "connected");

        let announcement = user.map_or_else(
            || "Connected to assistant".to_string(),
            |user| format!("Connected to assistant as {user}"),
        );
        self.append(ChatMessage::system(announcement));
    }

    fn on_frame(&mut self, generation: u64, text: &str) {
        if !self.is_current(generation) {
            tracing::debug!(generation, "frame from superseded connection dropped");
            return;
        }
        match ChatMessage::from_frame(text) {
            Decoded::Control(kind) => tracing::trace!(?kind, "control frame"),
            Decoded::Message(message) => {
                self.append(message);
                self.start_responding_timer();
            }
            Decoded::Raw(message) => self.append(message),
        }
    }

    fn on_closed(&mut self, generation: u64, reason: &str) {
        if !self.is_current(generation) {
            tracing::debug!(generation, reason, "close from superseded connection ignored");
            return;
        }
        if let Some(link) = self.active.take().and_then(|active| active.link) {
            link.close();
        }

        let mut status = self.snapshot.borrow().status.clone();
        let recovery = status.lost(reason, &self.config.reconnect);
        let message = status.last_error().unwrap_or(reason).to_string();
        self.snapshot.send_modify(|s| {
            s.status = status;
            s.responding = false;
        });
        self.emit(SessionEvent::StateChanged(ConnectionState::Disconnected));
        self.emit(SessionEvent::Responding(false));
        self.emit(SessionEvent::Error(message));

        match recovery {
            Recovery::Retry { attempt, delay } => {
                tracing::info!(
                    attempt,
                    max_attempts = self.config.reconnect.max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    reason,
                    "connection lost; reconnect scheduled"
                );
                self.schedule_retry(delay);
            }
            Recovery::Exhausted => {
                tracing::warn!(reason, "connection lost; retry budget exhausted");
            }
        }
    }

    fn send(&mut self, text: String) -> Result<(), SendError> {
        if text.trim().is_empty() {
            return Err(SendError::Empty);
        }
        if !self.snapshot.borrow().status.is_connected() {
            return Err(SendError::NotConnected);
        }
        let Some(link) = self.active.as_ref().and_then(|a| a.link.clone()) else {
            return Err(SendError::NotConnected);
        };

        self.append(ChatMessage::user(text.clone()));
        self.set_responding(true);

        let generation = self.generation;
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = link.send(&text).await {
                let _ = tx.send(Internal::SendFailed {
                    generation,
                    error: e.to_string(),
                });
            }
        });
        Ok(())
    }

    fn switch_user(&mut self, user: UserId) {
        tracing::info!(user = %user, "switching identity");
        self.teardown();
        self.snapshot.send_modify(|s| {
            s.user = Some(user);
            s.messages.clear();
            s.status.reset();
            s.responding = false;
        });
        self.emit(SessionEvent::Cleared);
        self.emit(SessionEvent::Responding(false));
        self.open_connection();
    }

    fn schedule_retry(&mut self, delay: Duration) {
        self.cancel_retry();
        let tx = self.internal_tx.clone();
        let generation = self.generation;
        self.retry = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Internal::RetryDue { generation });
        }));
    }

    fn cancel_retry(&mut self) {
        if let Some(retry) = self.retry.take() {
            retry.abort();
        }
    }

    fn close_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.task.abort();
            if let Some(link) = active.link {
                link.close();
            }
            tracing::debug!(generation = active.generation, "connection closed");
        }
    }

    /// Cancels everything that could still report back.
    fn teardown(&mut self) {
        self.cancel_retry();
        self.close_active();
        self.indicators.abort_all();
    }

    fn start_responding_timer(&mut self) {
        self.set_responding(true);
        while self.indicators.try_join_next().is_some() {}
        let tx = self.internal_tx.clone();
        let generation = self.generation;
        let hold = self.config.responding_indicator;
        self.indicators.spawn(async move {
            tokio::time::sleep(hold).await;
            let _ = tx.send(Internal::RespondingExpired { generation });
        });
    }

    fn set_responding(&self, responding: bool) {
        let changed = self.snapshot.send_if_modified(|s| {
            let changed = s.responding != responding;
            s.responding = responding;
            changed
        });
        if changed {
            self.emit(SessionEvent::Responding(responding));
        }
    }

    fn append(&self, message: ChatMessage) {
        self.snapshot
            .send_modify(|s| s.messages.push(message.clone()));
        self.emit(SessionEvent::Message(message));
    }

    fn emit(&self, event: SessionEvent) {
        if let Err(mpsc::error::TrySendError::Full(event)) = self.events.try_send(event) {
            tracing::warn!(?event, "session event buffer full; event dropped");
        }
    }
}

/// Connection task: open the stream, then forward its frames until it
/// closes. Everything it reports is tagged with `generation`.
async fn run_connection<T: Transport>(
    transport: Arc<T>,
    user: UserId,
    generation: u64,
    connect_timeout: Duration,
    tx: mpsc::UnboundedSender<Internal<T::Link>>,
) {
    let (link, mut inbound) =
        match tokio::time::timeout(connect_timeout, transport.connect(&user)).await {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => {
                tracing::warn!(user = %user, generation, err = %e, "connect failed");
                let _ = tx.send(Internal::Closed {
                    generation,
                    reason: e.to_string(),
                });
                return;
            }
            Err(_) => {
                tracing::warn!(user = %user, generation, "connect timed out");
                let _ = tx.send(Internal::Closed {
                    generation,
                    reason: TransportError::Timeout.to_string(),
                });
                return;
            }
        };

    if tx
        .send(Internal::Opened {
            generation,
            link: Arc::new(link),
        })
        .is_err()
    {
        return;
    }

    let reason = loop {
        match inbound.recv().await {
            Some(InboundEvent::Frame(text)) => {
                if tx.send(Internal::Frame { generation, text }).is_err() {
                    return;
                }
            }
            Some(InboundEvent::Closed(reason)) => break reason,
            None => break None,
        }
    };

    let _ = tx.send(Internal::Closed {
        generation,
        reason: reason.unwrap_or_else(|| TransportError::ConnectionClosed.to_string()),
    });
}
