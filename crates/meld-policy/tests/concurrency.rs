//! Readers racing a writer on a shared engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use meld_core::{MemberDescriptor, Modifiers, TypeDescriptor};
use meld_policy::{ClassSpec, InventoryManifest, PolicyEngine, RootDefinition, merge_inventory};

const READERS: usize = 4;
const ROUNDS: usize = 500;

#[test]
fn readers_never_see_stale_decision_after_registration() {
    let engine = Arc::new(PolicyEngine::default());
    let registered = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..READERS)
        .map(|reader| {
            let engine = Arc::clone(&engine);
            let registered = Arc::clone(&registered);
            thread::spawn(move || {
                for round in 0..ROUNDS {
                    let ty = TypeDescriptor::new(format!("com.acme.Widget{}", (reader + round) % 7));
                    let seen = registered.load(Ordering::SeqCst);
                    let transformable = engine.is_transformable(&ty).unwrap();
                    if seen {
                        assert!(transformable, "stale decision for {}", ty.name());
                    }
                }
            })
        })
        .collect();

    engine.add_include_pattern("com.acme.*");
    registered.store(true, Ordering::SeqCst);

    for reader in readers {
        reader.join().unwrap();
    }
    assert!(engine.is_transformable(&TypeDescriptor::new("com.acme.Widget3")).unwrap());
}

#[test]
fn mixed_registrations_and_queries() {
    let engine = Arc::new(PolicyEngine::default());
    engine.add_include_pattern("com.acme.*");

    thread::scope(|scope| {
        let writer = Arc::clone(&engine);
        let _ = scope.spawn(move || {
            for i in 0..50 {
                writer
                    .add_root(RootDefinition::new(format!("org.other.Holder{i}"), "value"), true)
                    .unwrap();
                writer.add_write_autolock(format!("* com.acme.Counter.op{i}(..)"));
                writer.add_transient("com.acme.Widget", &format!("scratch{i}")).unwrap();
            }
        });

        for _ in 0..READERS {
            let reader = Arc::clone(&engine);
            let _ = scope.spawn(move || {
                let widget = TypeDescriptor::new("com.acme.Widget");
                let op = MemberDescriptor::new("com.acme.Counter", "op7")
                    .with_modifiers(Modifiers::PUBLIC | Modifiers::SYNCHRONIZED);
                for _ in 0..ROUNDS {
                    let decision = reader.decide(&widget).unwrap();
                    assert!(decision.transformable());
                    assert!(reader.lock_definitions_for(&op).unwrap().len() <= 1);
                    let _ = reader.is_transformable(&TypeDescriptor::new("org.other.Holder9")).unwrap();
                }
            });
        }
    });

    assert_eq!(engine.all_roots().len(), 50);
    assert!(engine.is_transformable(&TypeDescriptor::new("org.other.Holder49")).unwrap());
    assert!(engine.has_spec("org.other.Holder0"));
}

#[test]
fn inventory_merge_races_live_registration() {
    const TYPES: usize = 200;

    for round in 0..20 {
        let engine = PolicyEngine::default();
        let names: Vec<String> = (0..TYPES).map(|i| format!("com.acme.T{round}x{i}")).collect();
        let manifest = InventoryManifest::new(names.iter().cloned());

        let (merged, registered) = thread::scope(|scope| {
            let merger = scope.spawn(|| merge_inventory(&engine, &manifest));
            let registrar = scope.spawn(|| {
                names
                    .iter()
                    .filter(|name| engine.add_spec_if_absent(ClassSpec::new(name.as_str())))
                    .count()
            });
            (merger.join().unwrap(), registrar.join().unwrap())
        });

        assert_eq!(merged + registered, TYPES, "round {round}");
        assert_eq!(engine.all_specs(true).len(), TYPES);
        assert_eq!(engine.all_specs(false).len(), registered);
    }
}
