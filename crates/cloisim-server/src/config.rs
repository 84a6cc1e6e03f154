//! Server configuration.

use std::time::Duration;

use cloisim_settings::ServiceSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the control server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent control connections. Upgrades beyond this get 503.
    pub max_connections: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Drop sessions that stop answering pings.
    pub keep_clean: bool,
    /// Interval between server pings in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Extra grace after a missed pong, in milliseconds.
    pub wait_time_ms: u64,
}

impl ServerConfig {
    /// Ping cadence.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }

    /// Silence after which a session is considered dead.
    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.saturating_add(self.wait_time_ms))
    }

    /// `host:port` string for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 50,
            max_message_size: 1024 * 1024,
            keep_clean: true,
            heartbeat_interval_ms: 30_000,
            wait_time_ms: 5_000,
        }
    }
}

impl From<&ServiceSettings> for ServerConfig {
    fn from(s: &ServiceSettings) -> Self {
        Self {
            host: s.host.clone(),
            port: s.port,
            max_connections: s.max_connections,
            max_message_size: s.max_message_size,
            keep_clean: s.keep_clean,
            heartbeat_interval_ms: s.heartbeat_interval_ms,
            wait_time_ms: s.wait_time_ms,
        }
    }
}
