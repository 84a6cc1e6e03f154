//! Control request dispatch.

use std::sync::Arc;

use cloisim_core::{BridgeRegistry, SimulationController};
use metrics::counter;
use tracing::{error, info, warn};

use super::protocol::{
    ControlRequest, ControlResponse, DEVICE_LIST, INVALID_COMMAND, RESET, TOPIC_LIST,
};
use crate::metrics::{CONTROL_DECODE_FAILURES_TOTAL, CONTROL_REQUESTS_TOTAL};

/// Answers control requests against the live registry and simulation.
///
/// Stateless apart from its two collaborators, so one instance is shared by
/// every connection.
pub struct ControlService {
    registry: Arc<dyn BridgeRegistry>,
    controller: Arc<dyn SimulationController>,
}

impl ControlService {
    /// Create a service over the given collaborators.
    pub fn new(
        registry: Arc<dyn BridgeRegistry>,
        controller: Arc<dyn SimulationController>,
    ) -> Self {
        Self {
            registry,
            controller,
        }
    }

    /// Handle one inbound text payload.
    ///
    /// Returns the encoded reply, or `None` when the frame is empty or is not
    /// a valid control request.
    pub fn handle_text(&self, text: &str) -> Option<String> {
        if text.is_empty() {
            return None;
        }

        let request: ControlRequest = match serde_json::from_str(text) {
            Ok(request) => request,
            Err(e) => {
                warn!(error = %e, len = text.len(), "invalid JSON format, dropping frame");
                counter!(CONTROL_DECODE_FAILURES_TOTAL).increment(1);
                return None;
            }
        };

        let indent = request.indent;
        let response = self.dispatch(request);
        log_response(&response);
        counter!(CONTROL_REQUESTS_TOTAL, "command" => response.command().to_string()).increment(1);

        match response.encode(indent) {
            Ok(json) => Some(json),
            Err(e) => {
                error!(error = %e, command = response.command(), "failed to encode control response");
                None
            }
        }
    }

    /// Dispatch a decoded request.
    pub fn dispatch(&self, mut request: ControlRequest) -> ControlResponse {
        let mut response = match request.command.as_str() {
            RESET => ControlResponse::outcome(String::new(), self.controller.trigger_reset()),
            DEVICE_LIST => ControlResponse::DeviceList {
                command: String::new(),
                result: self.registry.device_map(&request.filter),
            },
            TOPIC_LIST => ControlResponse::TopicList {
                command: String::new(),
                result: self.registry.topic_port_map(&request.filter),
            },
            _ => {
                request.command = INVALID_COMMAND.to_string();
                ControlResponse::invalid()
            }
        };
        response.set_command(request.command);
        response
    }
}

fn log_response(response: &ControlResponse) {
    match response {
        ControlResponse::Normal { command, result } => {
            info!(command = %command, result = %result, "control command handled");
        }
        // Polled continuously by clients.
        ControlResponse::DeviceList { .. } => {}
        ControlResponse::TopicList { command, result } => {
            info!(command = %command, topics = result.len(), "control command handled");
        }
        ControlResponse::Invalid { command } => {
            info!(command = %command, "control command handled");
        }
    }
}
