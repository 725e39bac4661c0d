//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]`. Each section implements
//! [`Default`], and `#[serde(default)]` allows partial JSON: missing fields get
//! their default value during deserialization.

mod policy;

pub use policy::*;

use serde::{Deserialize, Serialize};

/// Root settings type for the meld policy engine.
///
/// Loaded from `~/.meld/settings.json` with defaults applied for missing
/// fields. Environment variables can override specific values.
///
/// ```json
/// {
///   "logging": { "level": "debug" },
///   "policy": {
///     "instrumentedClasses": [
///       { "kind": "include", "classExpression": "com.acme..*" }
///     ]
///   }
/// }
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeldSettings {
    /// Settings schema version.
    pub version: String,
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Transformation policy rules.
    pub policy: PolicySettings,
    /// Precomputed artifact inventory.
    pub inventory: InventorySettings,
}

impl Default for MeldSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            logging: LoggingSettings::default(),
            policy: PolicySettings::default(),
            inventory: InventorySettings::default(),
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Minimum level (`error`, `warn`, `info`, `debug`, `trace`).
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

/// Precomputed artifact inventory settings.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InventorySettings {
    /// Path to the inventory manifest (JSON).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<String>,
    /// Verify the manifest covers every pre-instrumented spec at startup.
    pub verify_on_start: bool,
}
