//! Control channel wire format.
//!
//! Inbound: `{"command": string, "indent": bool, "filter": string}`.
//! Outbound: `{"command": string, "result": ...}` with `command` first and
//! `result` omitted for the invalid-command reply.

use cloisim_core::{DeviceMap, TopicPortMap};
use serde::{Deserialize, Deserializer, Serialize};

/// Reset command.
pub const RESET: &str = "reset";
/// Device map query.
pub const DEVICE_LIST: &str = "device_list";
/// Topic/port query.
pub const TOPIC_LIST: &str = "topic_list";

/// Result sentinel for an accepted operation.
pub const SUCCESS: &str = "ok";
/// Result sentinel for a refused operation.
pub const FAIL: &str = "fail";
/// Command echoed back for anything unrecognised.
pub const INVALID_COMMAND: &str = "Invalid Command";

/// One decoded inbound frame.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlRequest {
    /// Command name.
    #[serde(deserialize_with = "null_as_default")]
    pub command: String,
    /// Pretty-print the reply.
    #[serde(deserialize_with = "null_as_default")]
    pub indent: bool,
    /// Name prefix narrowing list queries. Empty means everything.
    #[serde(deserialize_with = "null_as_default")]
    pub filter: String,
}

impl ControlRequest {
    /// Build a request.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    /// Set the filter.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Set pretty printing.
    #[must_use]
    pub fn with_indent(mut self, indent: bool) -> Self {
        self.indent = indent;
        self
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Reply to a control request. Serialized without a variant tag; the
/// `command` field identifies the shape.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ControlResponse {
    /// Operation outcome as [`SUCCESS`] or [`FAIL`].
    Normal {
        /// Echoed command.
        command: String,
        /// Outcome sentinel.
        result: String,
    },
    /// Devices grouped by model, link and sensor.
    DeviceList {
        /// Echoed command.
        command: String,
        /// Model → link → sensor → topic → port.
        result: DeviceMap,
    },
    /// Flat topic table.
    TopicList {
        /// Echoed command.
        command: String,
        /// Topic → port.
        result: TopicPortMap,
    },
    /// Unrecognised command.
    Invalid {
        /// Always [`INVALID_COMMAND`].
        command: String,
    },
}

impl ControlResponse {
    /// Outcome reply for a boolean result.
    pub fn outcome(command: impl Into<String>, success: bool) -> Self {
        Self::Normal {
            command: command.into(),
            result: if success { SUCCESS } else { FAIL }.to_string(),
        }
    }

    /// Reply for an unrecognised command.
    pub fn invalid() -> Self {
        Self::Invalid {
            command: INVALID_COMMAND.to_string(),
        }
    }

    /// Echoed command.
    pub fn command(&self) -> &str {
        match self {
            Self::Normal { command, .. }
            | Self::DeviceList { command, .. }
            | Self::TopicList { command, .. }
            | Self::Invalid { command } => command,
        }
    }

    /// Overwrite the echoed command.
    pub fn set_command(&mut self, value: String) {
        match self {
            Self::Normal { command, .. }
            | Self::DeviceList { command, .. }
            | Self::TopicList { command, .. }
            | Self::Invalid { command } => *command = value,
        }
    }

    /// Serialize for the wire, pretty-printed when `indent` is set.
    pub fn encode(&self, indent: bool) -> serde_json::Result<String> {
        if indent {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        }
    }
}
