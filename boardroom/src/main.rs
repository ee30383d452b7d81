//! `Boardroom`: line-oriented Kanban board with an assistant chat.
//!
//! Plain lines go to the assistant; slash commands drive the board and
//! the connection (`/help` lists them). Configuration via CLI flags,
//! environment variables, or config file
//! (`~/.config/boardroom/config.toml`).
//!
//! ```bash
//! # WebSocket backend
//! cargo run --bin boardroom -- --url http://127.0.0.1:8000 --user alice
//!
//! # Server-sent events, configured from the environment
//! BOARDROOM_TRANSPORT=sse BOARDROOM_USER=alice cargo run --bin boardroom
//! ```

use std::io;
use std::path::Path;

use chrono::Local;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_appender::non_blocking::WorkerGuard;

use boardroom::app::{App, AppAction};
use boardroom::board::Board;
use boardroom::config::{CliArgs, ClientConfig};
use boardroom::session::{ChatSession, SessionEvent};
use boardroom::transport::sse::SseTransport;
use boardroom::transport::websocket::WebSocketTransport;
use boardroom::transport::{Transport, TransportKind};

#[tokio::main]
async fn main() -> io::Result<()> {
    let cli = CliArgs::parse();

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Warning: failed to load config file: {e}");
            ClientConfig::default()
        }
    };

    // Logs go to a file so they never interleave with the chat.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    tracing::info!(
        transport = %config.transport,
        url = %config.base_url,
        "boardroom starting"
    );

    let board = Board::seed(Local::now().date_naive())
        .map_err(io::Error::other)?
        .with_default_deadline_days(config.default_deadline_days);
    let app = App::new(board);

    let result = match config.transport {
        TransportKind::WebSocket => {
            let transport = WebSocketTransport::new(&config.base_url).map_err(io::Error::other)?;
            run(transport, app, &config).await
        }
        TransportKind::Sse => {
            let transport = SseTransport::new(&config.base_url).map_err(io::Error::other)?;
            run(transport, app, &config).await
        }
        TransportKind::Loopback => Err(io::Error::other(
            "the loopback backend is only available to tests",
        )),
    };

    tracing::info!("boardroom exiting");
    result
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown so buffered
/// log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("boardroom.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

/// Main loop: stdin lines in, session events out.
async fn run<T: Transport>(transport: T, mut app: App, config: &ClientConfig) -> io::Result<()> {
    let (session, mut events) = ChatSession::spawn(transport, config.to_session_config());

    println!(
        "Boardroom ({} via {}). Type /help for commands.",
        config.base_url,
        session.transport_kind()
    );
    match config.user.clone() {
        Some(user) => session.connect(user).await.map_err(io::Error::other)?,
        None => println!("No user set; use /user <id> to connect."),
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let today = Local::now().date_naive();
                for action in app.handle_line(&line, today) {
                    if !dispatch(&session, action).await {
                        session.shutdown().await;
                        return Ok(());
                    }
                }
            }
            Some(event) = events.recv() => print_event(&event),
        }
    }

    session.shutdown().await;
    Ok(())
}

/// Carry out one action. Returns `false` when the client should exit.
async fn dispatch(session: &ChatSession, action: AppAction) -> bool {
    let result = match action {
        AppAction::Print(text) => {
            println!("{text}");
            Ok(())
        }
        AppAction::Send(text) => {
            // Refusals also arrive as SessionEvent::Error.
            if let Err(e) = session.send(text).await {
                tracing::debug!(err = %e, "send not performed");
            }
            Ok(())
        }
        AppAction::Notify(message) => session.notify(message).await,
        AppAction::SwitchUser(user) => session.switch_user(user).await,
        AppAction::Reconnect => match session.reconnect().await {
            Err(boardroom::session::SessionError::NoUser) => Ok(()),
            other => other,
        },
        AppAction::Quit => return false,
    };
    if let Err(e) = result {
        println!("! {e}");
        return false;
    }
    true
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::StateChanged(state) => println!("-- {state}"),
        SessionEvent::Message(message) => println!("{message}"),
        SessionEvent::Responding(true) => println!("-- assistant is responding..."),
        SessionEvent::Responding(false) => {}
        SessionEvent::Error(error) => println!("! {error}"),
        SessionEvent::Cleared => println!("-- chat cleared"),
    }
}
