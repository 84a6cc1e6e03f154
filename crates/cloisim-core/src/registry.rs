//! Device/topic map shapes and the collaborator traits queried by the
//! control channel.
//!
//! The device map is four levels deep:
//!
//! ```json
//! {
//!   "ModelName": {
//!     "LinkName": {
//!       "SensorName": { "topic_name": 49152 }
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;

/// Topic name → bridge port.
pub type TopicPortMap = BTreeMap<String, u16>;

/// Sensor name → topics published by that sensor.
pub type SensorMap = BTreeMap<String, TopicPortMap>;

/// Link name → sensors mounted on that link.
pub type LinkMap = BTreeMap<String, SensorMap>;

/// Model name → links of that model.
pub type DeviceMap = BTreeMap<String, LinkMap>;

/// Read-only view of the live device/topic bindings.
///
/// Implementations provide their own synchronisation; callers may query
/// from many connections at once.
pub trait BridgeRegistry: Send + Sync {
    /// Devices grouped by model. An empty `filter` returns every model.
    fn device_map(&self, filter: &str) -> DeviceMap;

    /// Flat topic → port table. An empty `filter` returns every topic.
    fn topic_port_map(&self, filter: &str) -> TopicPortMap;
}

/// Handle onto the running simulation.
pub trait SimulationController: Send + Sync {
    /// Request a simulation reset. Returns `true` if the request was accepted.
    fn trigger_reset(&self) -> bool;
}

/// Keep the entries whose key starts with `filter`. An empty filter keeps all.
pub(crate) fn filter_by_prefix<V: Clone>(
    map: &BTreeMap<String, V>,
    filter: &str,
) -> BTreeMap<String, V> {
    if filter.is_empty() {
        return map.clone();
    }
    map.iter()
        .filter(|(key, _)| key.starts_with(filter))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
