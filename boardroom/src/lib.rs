//! `Boardroom`: Kanban board state and a streaming assistant chat client.

pub mod app;
pub mod board;
pub mod chat;
pub mod config;
pub mod session;
pub mod transport;
