//! # cloisim-core
//!
//! Registry model shared by the CLOiSim control channel.
//!
//! - [`registry`]: device/topic map shapes and the collaborator traits the
//!   control channel queries ([`BridgeRegistry`], [`SimulationController`])
//! - [`bridge`]: [`BridgeManager`], the in-memory registry that hands out
//!   bridge ports to simulated devices
//! - [`reset`]: [`ResetLatch`], a simulation controller backed by a
//!   trigger/in-progress latch
//! - [`errors`]: typed errors for registry operations

#![deny(unsafe_code)]

pub mod bridge;
pub mod errors;
pub mod registry;
pub mod reset;

pub use bridge::{Allocation, BridgeManager, DeviceBinding, PortProbe};
pub use errors::{BridgeError, Result};
pub use registry::{
    BridgeRegistry, DeviceMap, LinkMap, SensorMap, SimulationController, TopicPortMap,
};
pub use reset::ResetLatch;
