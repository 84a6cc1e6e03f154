//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]`, so partial
//! JSON is accepted and missing fields keep their compiled default.

mod logging;
mod service;

pub use logging::*;
pub use service::*;

use serde::{Deserialize, Serialize};

/// Root settings type for the control service.
///
/// ```json
/// {
///   "version": "0.1.0",
///   "name": "cloisim",
///   "server": { "port": 8080 },
///   "logging": { "level": "debug" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloisimSettings {
    /// Settings schema version.
    pub version: String,
    /// Application name.
    pub name: String,
    /// Network and session settings for the control server.
    pub server: ServiceSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for CloisimSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            name: "cloisim".to_string(),
            server: ServiceSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}
