//! # cloisim-settings
//!
//! Configuration for the CLOiSim control service, loaded from three layers
//! (in priority order):
//! 1. **Compiled defaults** — [`CloisimSettings::default()`]
//! 2. **User file** — `~/.cloisim/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `CLOISIM_*` overrides (highest priority)

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<CloisimSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// The first call loads from the default path; if that fails, compiled
/// defaults are used.
pub fn get_settings() -> &'static CloisimSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// Hands the settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: CloisimSettings) -> std::result::Result<(), CloisimSettings> {
    SETTINGS.set(settings)
}
