//! Control protocol and request dispatch.

pub mod dispatch;
pub mod protocol;

pub use dispatch::ControlService;
pub use protocol::{ControlRequest, ControlResponse};
