//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`MeldSettings::default()`]
//! 2. If `~/.meld/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `MELD_*` environment variable overrides (highest priority)
//! 4. Validate the policy section
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::MeldSettings;

/// Log levels accepted by `MELD_LOG_LEVEL`.
pub const LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace", "off"];

/// Resolve the path to the settings file (`~/.meld/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".meld").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<MeldSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. Invalid JSON or an invalid
/// policy entry is an error.
pub fn load_settings_from_path(path: &Path) -> Result<MeldSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    settings.policy.validate()?;
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<MeldSettings> {
    let defaults = serde_json::to_value(MeldSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
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
pub fn apply_env_overrides(settings: &mut MeldSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// - `MELD_LOG_LEVEL`: one of [`LOG_LEVELS`]
/// - `MELD_ALLOW_DYNAMIC_SUBTYPES`, `MELD_INCLUDE_BUILTINS`,
///   `MELD_VERIFY_INVENTORY`: booleans (`true`/`1`/`yes`/`on` or
///   `false`/`0`/`no`/`off`)
/// - `MELD_INVENTORY_MANIFEST`: path
///
/// Invalid values are ignored with a warning.
pub fn apply_overrides<F>(settings: &mut MeldSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = read_log_level(&lookup, "MELD_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_bool(&lookup, "MELD_ALLOW_DYNAMIC_SUBTYPES") {
        settings.policy.allow_dynamic_subtypes = v;
    }
    if let Some(v) = read_bool(&lookup, "MELD_INCLUDE_BUILTINS") {
        settings.policy.include_builtins = v;
    }
    if let Some(v) = read_string(&lookup, "MELD_INVENTORY_MANIFEST") {
        settings.inventory.manifest_path = Some(v);
    }
    if let Some(v) = read_bool(&lookup, "MELD_VERIFY_INVENTORY") {
        settings.inventory.verify_on_start = v;
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

/// Parse a log level name (case-insensitive) into its lowercase form.
pub fn parse_log_level(val: &str) -> Option<String> {
    let lower = val.trim().to_lowercase();
    LOG_LEVELS.contains(&lower.as_str()).then_some(lower)
}

// ── Readers ─────────────────────────────────────────────────────────────────

fn read_string<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name).filter(|v| !v.is_empty())
}

fn read_bool<F>(lookup: &F, name: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let val = lookup(name)?;
    let result = parse_bool(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_log_level<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let val = lookup(name)?;
    let result = parse_log_level(&val);
    if result.is_none() {
        warn!(key = name, value = %val, "invalid log level env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
