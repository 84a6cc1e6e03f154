//! Control sessions: per-connection state, tracking and the session loop.

pub mod connection;
pub mod session;
pub mod tracker;
