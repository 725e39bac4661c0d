//! Error types for the policy engine.
//!
//! Only recoverable conditions live here. Contract violations (reading an
//! uncommitted lock definition, asking for the name of a field that is not a
//! root, registering a second spec for a type) panic instead.

use thiserror::Error;

use crate::matcher::PatternError;

/// Errors surfaced by policy operations.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// A rule expression could not be evaluated.
    #[error(transparent)]
    Pattern(#[from] PatternError),

    /// A field name was empty or not qualified by its declaring type.
    #[error("invalid field name: {name}")]
    InvalidFieldName {
        /// The offending name.
        name: String,
    },

    /// A root for the same (type, field) was already registered.
    #[error("duplicate root: {type_name}.{field}")]
    DuplicateRoot {
        /// Declaring type.
        type_name: String,
        /// Field name.
        field: String,
    },

    /// An argument failed validation.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// The inventory manifest could not be read.
    #[error("failed to load inventory manifest {path}: {message}")]
    Inventory {
        /// Manifest path.
        path: String,
        /// Underlying failure.
        message: String,
    },

    /// Pre-instrumented types are missing from the inventory.
    #[error("incomplete inventory: {missing} pre-instrumented type(s) missing")]
    IncompleteInventory {
        /// Number of missing types.
        missing: usize,
    },

    /// Settings could not be loaded.
    #[error(transparent)]
    Settings(#[from] meld_settings::SettingsError),
}

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
