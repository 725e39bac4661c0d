//! # meld-settings
//!
//! Layered configuration for the meld policy engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`MeldSettings::default()`]
//! 2. **User file**: `~/.meld/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `MELD_*` overrides (highest priority)
//!
//! The policy crate consumes [`PolicySettings`] during bootstrap. Within
//! `policy.instrumentedClasses` the first entry in the file is the first
//! rule consulted.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_file_layer, load_settings,
    load_settings_from_path, settings_path,
};
pub use types::*;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_path_under_home() {
        let path = settings_path();
        assert!(path.ends_with(".meld/settings.json"));
    }

    #[test]
    fn default_settings_serialize_camel_case() {
        let value = serde_json::to_value(MeldSettings::default()).unwrap();
        assert_eq!(value["policy"]["includeBuiltins"], true);
        assert_eq!(value["inventory"]["verifyOnStart"], false);
        assert!(value["inventory"].get("manifestPath").is_none());
        assert_eq!(value["logging"]["level"], "warn");
    }

    #[test]
    fn validation_error_message() {
        let mut settings = MeldSettings::default();
        settings.policy.locks.push(LockSetting {
            method_expression: String::new(),
            name: Some("counter".into()),
            level: LockLevelSetting::Write,
            auto_synchronized: false,
            provenance: None,
        });
        let err = settings.policy.validate().unwrap_err();
        insta::assert_snapshot!(err.to_string(), @"locks: empty expression");
    }
}
