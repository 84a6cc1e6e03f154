//! Device manifest: bindings registered with the bridge manager at startup.
//!
//! The manifest is a JSON array:
//!
//! ```json
//! [{"model": "Robot1", "link": "base_link", "sensor": "lidar", "topic": "scan"}]
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use cloisim_core::{BridgeManager, DeviceBinding};
use tracing::{info, warn};

/// Read a manifest file.
pub fn load(path: &Path) -> Result<Vec<DeviceBinding>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid manifest: {}", path.display()))
}

/// Allocate a port for every binding. Bindings that fail are logged and
/// skipped. Returns the number allocated.
pub fn seed(bridges: &BridgeManager, bindings: &[DeviceBinding]) -> usize {
    let mut allocated = 0;
    for binding in bindings {
        match bridges.allocate_device(binding) {
            Ok(allocation) => {
                info!(
                    model = %binding.model,
                    sensor = %binding.sensor,
                    topic = %binding.topic,
                    port = allocation.port,
                    "device bridge allocated"
                );
                allocated += 1;
            }
            Err(e) => warn!(model = %binding.model, error = %e, "skipping device"),
        }
    }
    allocated
}
