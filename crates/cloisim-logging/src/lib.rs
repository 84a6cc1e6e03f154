//! # cloisim-logging
//!
//! `tracing` subscriber setup for the control service.
//!
//! The WebSocket and HTTP stacks log every frame and handshake at debug
//! level. Those targets are pinned to their own (quiet) level so that a
//! verbose service log does not drown in transport chatter. `RUST_LOG`
//! still overrides everything.

#![deny(unsafe_code)]

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Targets treated as transport noise.
pub const TRANSPORT_TARGETS: &[&str] = &[
    "tungstenite",
    "tokio_tungstenite",
    "hyper",
    "hyper_util",
    "axum",
    "tower_http",
];

/// Subscriber options.
#[derive(Clone, Debug)]
pub struct LogOptions {
    /// Level for everything that is not transport.
    pub level: String,
    /// Level for [`TRANSPORT_TARGETS`].
    pub transport_level: String,
    /// Emit JSON lines.
    pub json: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: "info".into(),
            transport_level: "error".into(),
            json: false,
        }
    }
}

/// Filter directives for `options`, e.g. `info,tungstenite=error,...`.
pub fn filter_directives(options: &LogOptions) -> String {
    let mut directives = options.level.clone();
    for target in TRANSPORT_TARGETS {
        directives.push_str(&format!(",{target}={}", options.transport_level));
    }
    directives
}

/// Install the global subscriber.
///
/// Returns `false` if a subscriber was already installed.
pub fn init_subscriber(options: &LogOptions) -> bool {
    let directives = filter_directives(options);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&directives));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if options.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };
    if result.is_ok() {
        tracing::debug!(%directives, json = options.json, "log subscriber installed");
    }
    result.is_ok()
}
