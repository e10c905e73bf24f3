//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`RelaySettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply `RELAY_*` environment overrides
//! 4. Validate
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use relay_core::LogFormat;
use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::RelaySettings;

/// Resolve the default settings file path (`~/.relay/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".relay").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<RelaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON or an invalid merged result
/// is an error.
pub fn load_settings_from_path(path: &Path) -> Result<RelaySettings> {
    let mut settings = read_layers(path)?;
    apply_env_overrides(&mut settings);
    settings.validate()?;
    Ok(settings)
}

fn read_layers(path: &Path) -> Result<RelaySettings> {
    let defaults = serde_json::to_value(RelaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
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

/// Apply process environment overrides.
pub fn apply_env_overrides(settings: &mut RelaySettings) {
    apply_overrides(settings, |key| std::env::var(key).ok());
}

/// Apply overrides read through `lookup`.
///
/// Values that fail to parse or fall outside their range are ignored with a
/// warning, leaving the file/default value in place.
pub fn apply_overrides(settings: &mut RelaySettings, lookup: impl Fn(&str) -> Option<String>) {
    let read = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = read("RELAY_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read("RELAY_PORT") {
        if let Some(port) = checked(&v, "RELAY_PORT", |s| parse_range::<u16>(s, 0, u16::MAX)) {
            settings.server.port = port;
        }
    }
    if let Some(v) = read("RELAY_QUEUE_CAPACITY") {
        if let Some(n) = checked(&v, "RELAY_QUEUE_CAPACITY", |s| parse_range(s, 1, 65_536)) {
            settings.hub.queue_capacity = n;
        }
    }
    if let Some(v) = read("RELAY_MAX_FRAME_BYTES") {
        if let Some(n) = checked(&v, "RELAY_MAX_FRAME_BYTES", |s| {
            parse_range(s, 1, 16 * 1024 * 1024)
        }) {
            settings.hub.max_frame_bytes = n;
        }
    }
    if let Some(v) = read("RELAY_READ_DEADLINE_SECS") {
        if let Some(n) = checked(&v, "RELAY_READ_DEADLINE_SECS", |s| parse_range(s, 2, 3600)) {
            settings.hub.read_deadline_secs = n;
        }
    }
    if let Some(v) = read("RELAY_HEARTBEAT_SECS") {
        if let Some(n) = checked(&v, "RELAY_HEARTBEAT_SECS", |s| parse_range(s, 1, 3599)) {
            settings.hub.heartbeat_interval_secs = n;
        }
    }
    if let Some(v) = read("RELAY_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read("RELAY_LOG_FORMAT") {
        if let Some(format) = checked(&v, "RELAY_LOG_FORMAT", parse_log_format) {
            settings.logging.format = format;
        }
    }
}

fn checked<T>(val: &str, key: &str, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let result = parse(val);
    if result.is_none() {
        warn!(key, value = %val, "invalid env var, ignoring");
    }
    result
}

/// Parse a number within an inclusive range.
pub fn parse_range<T>(val: &str, min: T, max: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let n: T = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a log format name (case-insensitive).
pub fn parse_log_format(val: &str) -> Option<LogFormat> {
    match val.to_lowercase().as_str() {
        "compact" => Some(LogFormat::Compact),
        "json" => Some(LogFormat::Json),
        _ => None,
    }
}
