//! Engine construction from a settings file on disk.

use std::io::Write;

use assert_matches::assert_matches;
use meld_core::{MemberDescriptor, Modifiers, TypeDescriptor};
use meld_policy::{DecisionReason, OnLoad, PolicyError, TransformMode, bootstrap};
use meld_settings::load_file_layer;
use tempfile::NamedTempFile;

fn write_json(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(json.as_bytes()).unwrap();
    file
}

#[test]
fn settings_file_drives_decisions() {
    let settings_file = write_json(
        r#"{
            "policy": {
                "instrumentedClasses": [
                    { "kind": "exclude", "classExpression": "com.acme.internal..*" },
                    { "classExpression": "com.acme..*", "honorTransient": true, "onLoad": { "method": "rehydrate" } }
                ],
                "roots": [{ "field": "org.vendor.Registry.instances" }],
                "locks": [{ "methodExpression": "* com.acme.Counter.*(..)", "level": "write" }],
                "distributedMethods": [{ "methodExpression": "* com.acme.Bus.publish(..)" }]
            }
        }"#,
    );
    let settings = load_file_layer(settings_file.path()).unwrap();
    let engine = bootstrap(&settings).unwrap();

    let widget = TypeDescriptor::new("com.acme.ui.Widget")
        .with_field("cache", "java.util.Map", Modifiers::PRIVATE | Modifiers::TRANSIENT);
    let decision = engine.decide(&widget).unwrap();
    assert_eq!(decision.reason(), DecisionReason::IncludeRule);
    assert_eq!(decision.mode(), TransformMode::FullyTransformable);
    assert_eq!(decision.on_load(), OnLoad::Method("rehydrate".into()));
    assert!(decision.is_transient(widget.field("cache").unwrap()));

    let hidden = TypeDescriptor::new("com.acme.internal.Wiring");
    assert_eq!(engine.explain(&hidden).unwrap().reason, DecisionReason::ExcludeRule);

    let registry = TypeDescriptor::new("org.vendor.Registry");
    assert_eq!(engine.explain(&registry).unwrap().reason, DecisionReason::DeclaresRoot);

    let increment = MemberDescriptor::new("com.acme.Counter", "increment")
        .with_modifiers(Modifiers::PUBLIC | Modifiers::SYNCHRONIZED);
    assert!(engine.is_lock_method(&increment).unwrap());

    let publish = MemberDescriptor::new("com.acme.Bus", "publish");
    assert!(engine.distributed_method_for(&publish).unwrap().unwrap().run_on_all_nodes);

    // Built-in defaults are installed underneath the file's rules.
    assert!(!engine.is_transformable(&TypeDescriptor::new("java.lang.Thread")).unwrap());
}

#[test]
fn inventory_is_merged_after_user_rules() {
    let manifest = write_json(r#"{ "types": ["com.acme.Shipped", "java.util.HashMap"] }"#);
    let settings_file = write_json(&format!(
        r#"{{
            "policy": {{ "instrumentedClasses": [{{ "kind": "exclude", "classExpression": "com.acme.*" }}] }},
            "inventory": {{ "manifestPath": {path} }}
        }}"#,
        path = serde_json::to_string(&manifest.path()).unwrap(),
    ));
    let settings = load_file_layer(settings_file.path()).unwrap();
    let engine = bootstrap(&settings).unwrap();

    let shipped = TypeDescriptor::new("com.acme.Shipped");
    assert_eq!(engine.explain(&shipped).unwrap().reason, DecisionReason::ExplicitSpec);
    // The built-in spec is kept, not replaced by an inventory spec.
    assert!(engine.is_logical("java.util.HashMap"));
    assert!(engine.all_specs(false).iter().all(|spec| spec.name().as_str() != "com.acme.Shipped"));
}

#[test]
fn verify_on_start_fails_on_incomplete_inventory() {
    let manifest = write_json(r#"{ "types": ["java.util.concurrent.locks.ReentrantLock"] }"#);
    let settings_file = write_json(&format!(
        r#"{{ "inventory": {{ "manifestPath": {path}, "verifyOnStart": true }} }}"#,
        path = serde_json::to_string(&manifest.path()).unwrap(),
    ));
    let settings = load_file_layer(settings_file.path()).unwrap();

    assert_matches!(
        bootstrap(&settings),
        Err(PolicyError::IncompleteInventory { missing }) if missing > 0
    );
}

#[test]
fn missing_manifest_is_reported() {
    let mut settings = meld_settings::MeldSettings::default();
    settings.inventory.manifest_path = Some("/nonexistent/meld-inventory.json".into());
    assert_matches!(bootstrap(&settings), Err(PolicyError::Inventory { .. }));
}
