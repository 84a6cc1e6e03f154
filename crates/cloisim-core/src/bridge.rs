//! In-memory bridge registry with port allocation.
//!
//! Every simulated device publishes its topics on a dedicated TCP port. The
//! manager hands those ports out from the dynamic range and keeps two views
//! of the result: a flat hash-key → port table (for `topic_list`) and the
//! nested model → link → sensor → topic device map (for `device_list`).

use std::collections::{BTreeMap, HashSet};
use std::net::{Ipv4Addr, TcpListener};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{BridgeError, Result};
use crate::registry::{BridgeRegistry, DeviceMap, TopicPortMap, filter_by_prefix};

/// First port handed out (start of the IANA dynamic range).
pub const MIN_PORT: u16 = 49152;

/// Upper bound of the scan (exclusive).
pub const MAX_PORT: u16 = u16::MAX;

/// Checks whether a port can be bound on this host.
pub type PortProbe = Box<dyn Fn(u16) -> bool + Send + Sync>;

/// Where a device sits in the simulation, down to the topic it publishes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceBinding {
    /// Model name.
    pub model: String,
    /// Link (or plugin group) the sensor hangs off.
    pub link: String,
    /// Sensor name.
    pub sensor: String,
    /// Topic published by the sensor.
    pub topic: String,
}

impl DeviceBinding {
    /// Create a binding.
    pub fn new(
        model: impl Into<String>,
        link: impl Into<String>,
        sensor: impl Into<String>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            model: model.into(),
            link: link.into(),
            sensor: sensor.into(),
            topic: topic.into(),
        }
    }

    /// Key used in the flat topic table: model, sensor and topic concatenated.
    pub fn hash_key(&self) -> String {
        format!("{}{}{}", self.model, self.sensor, self.topic)
    }
}

/// Result of a successful allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Allocation {
    /// Hash key the port was registered under.
    pub key: String,
    /// Allocated port.
    pub port: u16,
}

#[derive(Default)]
struct Tables {
    ports: TopicPortMap,
    bindings: BTreeMap<String, DeviceBinding>,
    devices: DeviceMap,
}

impl Tables {
    fn insert(&mut self, key: &str, binding: &DeviceBinding, port: u16) {
        let _ = self.ports.insert(key.to_string(), port);
        let _ = self.bindings.insert(key.to_string(), binding.clone());
        let _ = self
            .devices
            .entry(binding.model.clone())
            .or_default()
            .entry(binding.link.clone())
            .or_default()
            .entry(binding.sensor.clone())
            .or_default()
            .insert(binding.topic.clone(), port);
    }
}

/// Thread-safe registry of device bridge ports.
pub struct BridgeManager {
    tables: RwLock<Tables>,
    probe: PortProbe,
}

impl BridgeManager {
    /// Create a manager that probes the host for free ports.
    pub fn new() -> Self {
        Self::with_probe(Box::new(host_port_available))
    }

    /// Create a manager with a custom availability probe.
    pub fn with_probe(probe: PortProbe) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            probe,
        }
    }

    /// Allocate a port for `binding` and record it in both tables.
    ///
    /// Candidate ports are probed without holding the table lock. A port
    /// claimed by a concurrent allocation in the meantime is skipped and the
    /// scan resumes.
    pub fn allocate_device(&self, binding: &DeviceBinding) -> Result<Allocation> {
        let key = binding.hash_key();
        if key.is_empty() {
            return Err(BridgeError::EmptyKey);
        }

        loop {
            let occupied: HashSet<u16> = {
                let tables = self.tables.read();
                if tables.ports.contains_key(&key) {
                    warn!(key, "hash key already occupied");
                    return Err(BridgeError::AlreadyAllocated(key));
                }
                tables.ports.values().copied().collect()
            };

            let Some(port) =
                (MIN_PORT..MAX_PORT).find(|p| !occupied.contains(p) && (self.probe)(*p))
            else {
                warn!(key, "failed to allocate port");
                return Err(BridgeError::PortsExhausted(key));
            };

            let mut tables = self.tables.write();
            if tables.ports.contains_key(&key) {
                warn!(key, "hash key already occupied");
                return Err(BridgeError::AlreadyAllocated(key));
            }
            if tables.ports.values().any(|&taken| taken == port) {
                debug!(key, port, "port claimed during probe, rescanning");
                continue;
            }

            tables.insert(&key, binding, port);
            debug!(key, port, "allocated bridge port");
            return Ok(Allocation { key, port });
        }
    }

    /// Release the port held by `key`. Returns the freed port.
    pub fn deallocate_device(&self, key: &str) -> Result<u16> {
        let mut tables = self.tables.write();
        let Some(port) = tables.ports.remove(key) else {
            warn!(key, "failed to remove hash key");
            return Err(BridgeError::NotFound(key.to_string()));
        };

        if let Some(binding) = tables.bindings.remove(key) {
            prune(&mut tables.devices, &binding);
        }

        debug!(key, port, "released bridge port");
        Ok(port)
    }

    /// Port registered under `key`, if any.
    pub fn search_port(&self, key: &str) -> Option<u16> {
        self.tables.read().ports.get(key).copied()
    }

    /// Number of allocated ports.
    pub fn len(&self) -> usize {
        self.tables.read().ports.len()
    }

    /// Whether no port is allocated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for BridgeManager {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeRegistry for BridgeManager {
    fn device_map(&self, filter: &str) -> DeviceMap {
        filter_by_prefix(&self.tables.read().devices, filter)
    }

    fn topic_port_map(&self, filter: &str) -> TopicPortMap {
        filter_by_prefix(&self.tables.read().ports, filter)
    }
}

/// Remove the topic leaf for `binding` and drop any level left empty.
fn prune(devices: &mut DeviceMap, binding: &DeviceBinding) {
    let Some(links) = devices.get_mut(&binding.model) else {
        return;
    };
    if let Some(sensors) = links.get_mut(&binding.link) {
        if let Some(topics) = sensors.get_mut(&binding.sensor) {
            let _ = topics.remove(&binding.topic);
            if topics.is_empty() {
                let _ = sensors.remove(&binding.sensor);
            }
        }
        if sensors.is_empty() {
            let _ = links.remove(&binding.link);
        }
    }
    if links.is_empty() {
        let _ = devices.remove(&binding.model);
    }
}

/// Whether `port` can currently be bound on all interfaces.
pub fn host_port_available(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
}
