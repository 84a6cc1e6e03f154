//! Control server network and session settings.

use serde::{Deserialize, Serialize};

/// Network and session settings for the control server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSettings {
    /// Bind address.
    pub host: String,
    /// WebSocket service port.
    pub port: u16,
    /// Maximum concurrent control connections.
    pub max_connections: usize,
    /// Maximum inbound frame size in bytes.
    pub max_message_size: usize,
    /// Sweep connections that stop answering pings.
    pub keep_clean: bool,
    /// Interval between server pings in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Grace period after a missed pong before the session is swept, in
    /// milliseconds.
    pub wait_time_ms: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_connections: 50,
            max_message_size: 1024 * 1024,
            keep_clean: true,
            heartbeat_interval_ms: 30_000,
            wait_time_ms: 5_000,
        }
    }
}
