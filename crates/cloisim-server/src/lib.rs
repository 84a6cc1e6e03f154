//! # cloisim-server
//!
//! Axum HTTP + `WebSocket` server for the CLOiSim control channel.
//!
//! - `/control`: `WebSocket` control sessions answering `reset`,
//!   `device_list` and `topic_list`
//! - `/health` and `/metrics` (Prometheus text)
//! - Heartbeat pings with optional sweeping of unresponsive sessions
//! - Graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod control;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod websocket;

pub use config::ServerConfig;
pub use control::{ControlRequest, ControlResponse, ControlService};
pub use errors::{Result, ServerError};
pub use server::{CONTROL_PATH, ControlServer};
