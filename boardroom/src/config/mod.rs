//! Configuration for the `Boardroom` client.
//!
//! Layered, highest priority first:
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/boardroom/config.toml`)
//! 4. Compiled defaults
//!
//! A missing default config file is not an error. An explicit `--config`
//! path that doesn't exist is.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::board::DEFAULT_DEADLINE_DAYS;
use crate::session::{ReconnectPolicy, SessionConfig};
use crate::transport::{TransportKind, UserId};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    chat: ChatFileConfig,
    reconnect: ReconnectFileConfig,
    board: BoardFileConfig,
}

/// `[chat]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChatFileConfig {
    base_url: Option<String>,
    transport: Option<TransportKind>,
    user: Option<String>,
    connect_timeout_secs: Option<u64>,
    responding_indicator_ms: Option<u64>,
    event_buffer: Option<usize>,
}

/// `[reconnect]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ReconnectFileConfig {
    base_delay_ms: Option<u64>,
    max_attempts: Option<u32>,
}

/// `[board]` section.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BoardFileConfig {
    default_deadline_days: Option<u64>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// HTTP(S) base URL of the chat service.
    pub base_url: String,
    /// Backend used to reach it.
    pub transport: TransportKind,
    /// Identity to connect as on startup. `None` waits for `/user`.
    pub user: Option<UserId>,
    /// Bound on a single connect attempt.
    pub connect_timeout: Duration,
    /// How long the responding indicator stays up after a reply.
    pub responding_indicator: Duration,
    /// Capacity of the session's command and event channels.
    pub event_buffer: usize,
    /// Automatic reconnect backoff.
    pub reconnect: ReconnectPolicy,
    /// Deadline offset for tasks added without one.
    pub default_deadline_days: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            transport: TransportKind::default(),
            user: None,
            connect_timeout: session.connect_timeout,
            responding_indicator: session.responding_indicator,
            event_buffer: session.event_buffer,
            reconnect: session.reconnect,
            default_deadline_days: DEFAULT_DEADLINE_DAYS,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    /// A missing file at the default location is not an error.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            base_url: cli
                .url
                .clone()
                .or_else(|| file.chat.base_url.clone())
                .unwrap_or(defaults.base_url),
            transport: cli
                .transport
                .or(file.chat.transport)
                .unwrap_or(defaults.transport),
            user: cli
                .user
                .clone()
                .or_else(|| file.chat.user.clone())
                .filter(|user| !user.trim().is_empty())
                .map(UserId::new),
            connect_timeout: file
                .chat
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            responding_indicator: file
                .chat
                .responding_indicator_ms
                .map_or(defaults.responding_indicator, Duration::from_millis),
            event_buffer: file
                .chat
                .event_buffer
                .unwrap_or(defaults.event_buffer),
            reconnect: ReconnectPolicy {
                base_delay: file
                    .reconnect
                    .base_delay_ms
                    .map_or(defaults.reconnect.base_delay, Duration::from_millis),
                max_attempts: file
                    .reconnect
                    .max_attempts
                    .unwrap_or(defaults.reconnect.max_attempts),
            },
            default_deadline_days: file
                .board
                .default_deadline_days
                .unwrap_or(defaults.default_deadline_days),
        }
    }

    /// Session tuning derived from this configuration.
    #[must_use]
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            reconnect: self.reconnect,
            connect_timeout: self.connect_timeout,
            responding_indicator: self.responding_indicator,
            event_buffer: self.event_buffer,
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Kanban board with a streaming assistant chat")]
pub struct CliArgs {
    /// Base URL of the chat service (http or https).
    #[arg(long, env = "BOARDROOM_URL")]
    pub url: Option<String>,

    /// Identity to connect as.
    #[arg(long, env = "BOARDROOM_USER")]
    pub user: Option<String>,

    /// Chat backend.
    #[arg(long, value_enum, env = "BOARDROOM_TRANSPORT")]
    pub transport: Option<TransportKind>,

    /// Path to config file (default: `~/.config/boardroom/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "BOARDROOM_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/boardroom.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

/// Load and parse a TOML config file.
///
/// An explicit path must exist. Otherwise the default path is tried and a
/// missing file yields an empty config.
fn load_config_file(explicit_path: Option<&Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(path) = explicit_path {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("boardroom").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
