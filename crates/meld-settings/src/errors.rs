//! Settings error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file {}: {source}", path.display())]
    Read {
        /// File that was being read.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The settings file is not valid JSON, or does not fit the schema.
    #[error("failed to parse settings JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// A policy section holds a blank rule expression.
    #[error("{section}: empty expression")]
    EmptyExpression {
        /// camelCase name of the section.
        section: &'static str,
    },
    /// A root or transient field is not written as `pkg.Type.field`.
    #[error("`{0}` is not a qualified field name")]
    UnqualifiedField(String),
    /// A lock entry combines settings that cannot be applied together.
    #[error("lock `{method_expression}`: {message}")]
    InvalidLock {
        /// Member pattern of the offending entry.
        method_expression: String,
        /// What is wrong with it.
        message: &'static str,
    },
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
