//! Shared board and chat wire definitions for `Boardroom`.

pub mod frame;
pub mod task;
