//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CloisimSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply `CLOISIM_*` environment overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::{CloisimSettings, LogLevel};

/// Port override, kept under the name the simulator has always read.
pub const SERVICE_PORT_ENV: &str = "CLOISIM_SERVICE_PORT";
/// Bind address override.
pub const HOST_ENV: &str = "CLOISIM_HOST";
/// Connection limit override.
pub const MAX_CONNECTIONS_ENV: &str = "CLOISIM_MAX_CONNECTIONS";
/// Log level override.
pub const LOG_LEVEL_ENV: &str = "CLOISIM_LOG_LEVEL";
/// JSON log output override.
pub const LOG_JSON_ENV: &str = "CLOISIM_LOG_JSON";

/// Resolve the path to the settings file (`~/.cloisim/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".cloisim").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CloisimSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<CloisimSettings> {
    let defaults = serde_json::to_value(CloisimSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: CloisimSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut CloisimSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Empty values are ignored. Values that fail to parse or fall outside
/// their range are logged and ignored.
pub fn apply_overrides<F>(settings: &mut CloisimSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = read(SERVICE_PORT_ENV) {
        match parse_u16_range(&v, 1, u16::MAX) {
            Some(port) => settings.server.port = port,
            None => tracing::warn!(key = SERVICE_PORT_ENV, value = %v, "invalid port env var, ignoring"),
        }
    }
    if let Some(v) = read(HOST_ENV) {
        settings.server.host = v;
    }
    if let Some(v) = read(MAX_CONNECTIONS_ENV) {
        match parse_usize_range(&v, 1, 10_000) {
            Some(n) => settings.server.max_connections = n,
            None => tracing::warn!(key = MAX_CONNECTIONS_ENV, value = %v, "invalid usize env var, ignoring"),
        }
    }
    if let Some(v) = read(LOG_LEVEL_ENV) {
        match LogLevel::parse(&v) {
            Some(level) => settings.logging.level = level,
            None => tracing::warn!(key = LOG_LEVEL_ENV, value = %v, "invalid log level env var, ignoring"),
        }
    }
    if let Some(v) = read(LOG_JSON_ENV) {
        match parse_bool(&v) {
            Some(json) => settings.logging.json = json,
            None => tracing::warn!(key = LOG_JSON_ENV, value = %v, "invalid boolean env var, ignoring"),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
