//! Inventory manifest and verification.
//!
//! The inventory is the set of types shipped already instrumented. Every
//! live spec marked pre-instrumented must appear in it, except
//! version-specific ones. Specs in the inventory partition are satisfied by
//! definition and are not checked.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use meld_core::TypeName;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::{PolicyError, Result};
use crate::spec_store::SpecStore;

/// Type names present in a precomputed inventory.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryManifest {
    /// Version of the build that produced the inventory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Types in the inventory.
    #[serde(default)]
    pub types: BTreeSet<TypeName>,
}

impl InventoryManifest {
    /// Manifest listing `types`.
    pub fn new<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TypeName>,
    {
        Self {
            version: None,
            types: types.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a manifest from JSON.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read a manifest file.
    pub fn load(path: &Path) -> Result<Self> {
        let inventory_error = |message: String| PolicyError::Inventory {
            path: path.display().to_string(),
            message,
        };
        let content = std::fs::read_to_string(path).map_err(|e| inventory_error(e.to_string()))?;
        Self::from_json(&content).map_err(|e| inventory_error(e.to_string()))
    }

    /// Whether `type_name` is in the inventory.
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains(&TypeName::new(type_name))
    }

    /// Number of types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the manifest lists nothing.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Outcome of comparing pre-instrumented specs with a manifest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryReport {
    /// Pre-instrumented types absent from the manifest, sorted.
    pub missing: Vec<TypeName>,
    /// Number of live specs marked pre-instrumented.
    pub expected: usize,
    /// Number of types in the manifest.
    pub population: usize,
}

impl InventoryReport {
    /// Number of missing types.
    pub fn missing_count(&self) -> usize {
        self.missing.len()
    }

    /// Whether nothing is missing.
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// The report, or [`PolicyError::IncompleteInventory`] when types are
    /// missing.
    pub fn into_result(self) -> Result<Self> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(PolicyError::IncompleteInventory {
                missing: self.missing_count(),
            })
        }
    }
}

impl fmt::Display for InventoryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} type(s) in inventory, {} pre-instrumented, {} missing",
            self.population,
            self.expected,
            self.missing_count()
        )?;
        for name in &self.missing {
            write!(f, "\n  - {name}")?;
        }
        Ok(())
    }
}

pub(crate) fn verify(specs: &SpecStore, manifest: &InventoryManifest) -> InventoryReport {
    let mut expected = 0;
    let mut missing = Vec::new();

    for spec in specs.all(false) {
        if !spec.is_pre_instrumented() {
            continue;
        }
        expected += 1;
        if spec.is_version_specific() || manifest.contains(spec.name()) {
            continue;
        }
        info!(type_name = %spec.name(), "Pre-instrumented type missing from inventory");
        missing.push(spec.name().clone());
    }

    InventoryReport {
        missing,
        expected,
        population: manifest.len(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use meld_core::logging::capture_logs;
    use tracing::Level;

    use super::*;
    use crate::spec::ClassSpec;

    fn pre_instrumented(name: &str) -> ClassSpec {
        let mut spec = ClassSpec::new(name);
        let _ = spec.mark_pre_instrumented();
        spec
    }

    fn store() -> SpecStore {
        let mut specs = SpecStore::new();
        specs.insert(pre_instrumented("com.acme.Present"));
        specs.insert(pre_instrumented("com.acme.Lost"));
        specs.insert(pre_instrumented("com.acme.Gone"));
        let mut versioned = pre_instrumented("com.acme.Versioned");
        let _ = versioned.set_version_specific(true);
        specs.insert(versioned);
        specs.insert(ClassSpec::new("com.acme.Plain"));
        specs.insert_inventory(pre_instrumented("com.acme.Shipped"));
        specs
    }

    #[test]
    fn reports_missing_pre_instrumented_types() {
        let manifest = InventoryManifest::new(["com.acme.Present", "com.acme.Extra"]);
        let report = verify(&store(), &manifest);

        assert_eq!(report.expected, 4);
        assert_eq!(report.population, 2);
        assert_eq!(report.missing_count(), 2);
        insta::assert_snapshot!(report.to_string(), @r"
        2 type(s) in inventory, 4 pre-instrumented, 2 missing
          - com.acme.Gone
          - com.acme.Lost
        ");
    }

    #[test]
    fn complete_inventory() {
        let manifest = InventoryManifest::new(["com.acme.Present", "com.acme.Lost", "com.acme.Gone"]);
        let report = verify(&store(), &manifest);
        assert!(report.is_complete());
        assert!(report.into_result().is_ok());
    }

    #[test]
    fn incomplete_inventory_is_an_error() {
        let report = verify(&store(), &InventoryManifest::default());
        assert_matches!(
            report.into_result(),
            Err(PolicyError::IncompleteInventory { missing: 3 })
        );
    }

    #[test]
    fn missing_types_are_logged() {
        let (logs, _guard) = capture_logs();
        let _ = verify(&store(), &InventoryManifest::new(["com.acme.Present"]));
        assert_eq!(logs.count_at_level(Level::INFO), 2);
        let events = logs.events();
        assert!(events
            .iter()
            .any(|e| e.field("type_name") == Some("com.acme.Gone")));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"version": "4.3.1", "types": ["com/acme/Present", "com.acme.Lost"]}}"#
        )
        .unwrap();

        let manifest = InventoryManifest::load(file.path()).unwrap();
        assert_eq!(manifest.version.as_deref(), Some("4.3.1"));
        assert!(manifest.contains("com.acme.Present"));
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn load_errors_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = InventoryManifest::load(&path).unwrap_err();
        assert_matches!(&err, PolicyError::Inventory { path: p, .. } if p.contains("absent.json"));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert_matches!(
            InventoryManifest::load(file.path()),
            Err(PolicyError::Inventory { .. })
        );
    }
}
