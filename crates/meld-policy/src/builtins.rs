//! Built-in library defaults.
//!
//! Installed before any user configuration, so user rules registered later
//! take precedence over these.
//!
//! ## Exclusions
//! - Threads, processes, class loaders, and types wrapping native resources
//!   (files, sockets, channels) are never transformed.
//! - Autolocks never apply to `java.lang.Throwable` members.
//!
//! ## Class specs
//! - Collection and date types handled by change applicators (logical).
//! - Collection and synchronizer base types that are adaptable only.
//! - Lock types that ship pre-instrumented, with a pre-create hook that
//!   refuses to share a lock while it is held.
//! - `java.lang.Object`, whose constructor runs when a shared instance loads.

use tracing::debug;

use crate::engine::PolicyEngine;
use crate::locks::LockLevel;
use crate::rules::OnLoad;
use crate::spec::{ClassSpec, ConstructionBehavior, MemberBehavior, TransformMode};

/// Provenance recorded on built-in autolocks.
pub const BUILTIN_PROVENANCE: &str = "builtin";

/// Pre-create hook installed on pre-instrumented lock types.
pub const VALIDATE_UNLOCKED_HOOK: &str = "validateInUnLockState";

/// Rewriter id for synchronizer subclasses that must hold their owner strongly.
pub const AQS_SUBCLASS_REWRITER: &str = "aqs-subclass-strong-reference";

/// Rewriter id for the queued synchronizer base itself.
pub const AQS_REWRITER: &str = "aqs";

/// Types that are never transformed.
pub const PERMANENT_EXCLUDES: &[&str] = &[
    "org.jboss.net.protocol..*",
    "java.awt.Component",
    "java.lang.Thread",
    "java.lang.Process",
    "java.lang.ClassLoader",
    "java.lang.Runtime",
    "java.io.FileReader",
    "java.io.FileWriter",
    "java.io.FileDescriptor",
    "java.io.FileInputStream",
    "java.io.FileOutputStream",
    "java.net.DatagramSocket",
    "java.net.DatagramSocketImpl",
    "java.net.MulticastSocket",
    "java.net.ServerSocket",
    "java.net.Socket",
    "java.net.SocketImpl",
    "java.nio.channels.DatagramChannel",
    "java.nio.channels.FileChannel",
    "java.nio.channels.FileLock",
    "java.nio.channels.ServerSocketChannel",
    "java.nio.channels.SocketChannel",
    "java.util.logging.FileHandler",
    "java.util.logging.SocketHandler",
];

/// Types that may be adapted but are never safely shared.
pub const NON_PORTABLE: &[&str] = &["javax.servlet.GenericServlet"];

/// Members never autolocked.
pub const AUTOLOCK_EXCLUDES: &[&str] = &["* java.lang.Throwable.*(..)"];

/// Write autolocks shipped with the library.
pub const WRITE_AUTOLOCKS: &[&str] = &["synchronized * java.util.Properties.*(..)"];

const CLEAR: &str = "clear()";
const PUT: &str = "put(java.lang.Object,java.lang.Object)";
const REMOVE_KEY: &str = "remove(java.lang.Object)";

/// Every built-in class spec.
pub fn builtin_specs() -> Vec<ClassSpec> {
    let mut specs = Vec::new();
    specs.extend(logical_specs());
    specs.extend(adaptable_specs());
    specs.extend(lock_specs());

    let mut object = ClassSpec::new("java.lang.Object");
    let _ = object.set_on_load(OnLoad::CallConstructor);
    specs.push(object);

    specs
}

fn logical_specs() -> Vec<ClassSpec> {
    let mut tree_map = ClassSpec::logical("java.util.TreeMap", "TreeMapApplicator");
    let _ = tree_map
        .set_construction(ConstructionBehavior::NonDefaultConstructor)
        .add_member_behavior(CLEAR, MemberBehavior::AlwaysLog)
        .add_member_behavior("entrySet()", MemberBehavior::ViewWrapper);

    let mut linked_map = ClassSpec::logical("java.util.LinkedHashMap", "LinkedHashMapApplicator");
    let _ = linked_map.set_construction(ConstructionBehavior::NonDefaultConstructor);

    let mut identity_map = ClassSpec::logical("java.util.IdentityHashMap", "HashMapApplicator");
    let _ = identity_map
        .add_member_behavior(PUT, MemberBehavior::AlwaysLog)
        .add_member_behavior(REMOVE_KEY, MemberBehavior::AlwaysLog)
        .add_member_behavior(CLEAR, MemberBehavior::AlwaysLog);

    let mut date = ClassSpec::logical("java.util.Date", "DateApplicator");
    let _ = date.add_member_behavior("setTime(long)", MemberBehavior::AlwaysLog);

    let mut timestamp = ClassSpec::logical("java.sql.Timestamp", "DateApplicator");
    let _ = timestamp.add_member_behavior("setNanos(int)", MemberBehavior::AlwaysLog);

    let mut url = ClassSpec::logical("java.net.URL", "UrlApplicator");
    let _ = url.set_honor_transient(true).add_member_behavior(
        "set(java.lang.String,java.lang.String,int,java.lang.String,java.lang.String)",
        MemberBehavior::AlwaysLog,
    );

    vec![
        tree_map,
        ClassSpec::logical("java.util.HashMap", "PartialHashMapApplicator"),
        linked_map,
        ClassSpec::logical("java.util.Hashtable", "PartialHashMapApplicator"),
        ClassSpec::logical("java.util.Properties", "PartialHashMapApplicator"),
        identity_map,
        ClassSpec::logical("java.util.HashSet", "HashSetApplicator"),
        ClassSpec::logical("java.util.LinkedHashSet", "HashSetApplicator"),
        ClassSpec::logical("java.util.TreeSet", "TreeSetApplicator"),
        ClassSpec::logical("java.util.LinkedList", "ListApplicator"),
        ClassSpec::logical("java.util.Collections$EmptyList", "ListApplicator"),
        ClassSpec::logical("java.util.Collections$EmptyMap", "HashMapApplicator"),
        ClassSpec::logical("java.util.Collections$EmptySet", "HashSetApplicator"),
        date,
        ClassSpec::logical("java.sql.Date", "DateApplicator"),
        ClassSpec::logical("java.sql.Time", "DateApplicator"),
        timestamp,
        url,
    ]
}

fn adaptable_specs() -> Vec<ClassSpec> {
    let mut specs = Vec::new();

    for name in [
        "java.util.AbstractCollection",
        "java.util.AbstractSequentialList",
        "java.util.Dictionary",
    ] {
        let mut spec = ClassSpec::new(name);
        let _ = spec.set_mode(TransformMode::AdaptableOnly);
        specs.push(spec);
    }

    for name in ["java.util.AbstractList", "javax.servlet.GenericServlet"] {
        let mut spec = ClassSpec::new(name);
        let _ = spec
            .set_mode(TransformMode::AdaptableOnly)
            .set_honor_transient(true);
        specs.push(spec);
    }

    // Fields declared here must be shared, so not adaptable-only.
    let mut abstract_map = ClassSpec::new("java.util.AbstractMap");
    let _ = abstract_map.set_honor_transient(true);
    specs.push(abstract_map);

    let mut bit_set = ClassSpec::new("java.util.BitSet");
    let _ = bit_set.set_honor_transient(false);
    specs.push(bit_set);

    for name in [
        "java.util.Collections$UnmodifiableCollection",
        "java.util.Collections$UnmodifiableList",
        "java.util.Collections$UnmodifiableMap",
        "java.util.Collections$UnmodifiableSet",
        "java.util.Collections$SynchronizedCollection",
        "java.util.Collections$SynchronizedList",
        "java.util.Collections$SynchronizedMap",
        "java.util.Collections$SynchronizedSet",
        "java.util.GregorianCalendar",
    ] {
        let mut spec = ClassSpec::new(name);
        let _ = spec.set_honor_transient(true);
        specs.push(spec);
    }

    specs
}

fn lock_specs() -> Vec<ClassSpec> {
    const LOCKS: &str = "java.util.concurrent.locks";

    let pre_instrumented = |simple: &str| {
        let mut spec = ClassSpec::new(format!("{LOCKS}.{simple}"));
        let _ = spec.mark_pre_instrumented();
        spec
    };

    let mut rw_lock = pre_instrumented("ReentrantReadWriteLock");
    let _ = rw_lock
        .set_pre_create_method(VALIDATE_UNLOCKED_HOOK)
        .set_on_load(OnLoad::CallConstructor)
        .set_honor_transient(true);

    let mut read_lock = pre_instrumented("ReentrantReadWriteLock$ReadLock");
    let _ = read_lock.set_pre_create_method(VALIDATE_UNLOCKED_HOOK);

    let mut write_lock = pre_instrumented("ReentrantReadWriteLock$WriteLock");
    let _ = write_lock.set_pre_create_method(VALIDATE_UNLOCKED_HOOK);

    let mut rw_sync = pre_instrumented("ReentrantReadWriteLock$Sync");
    let _ = rw_sync
        .set_honor_transient(true)
        .set_custom_rewriter(AQS_SUBCLASS_REWRITER);

    let mut rw_fair = pre_instrumented("ReentrantReadWriteLock$FairSync");
    let _ = rw_fair.set_on_load(OnLoad::CallConstructor);

    let mut lock = pre_instrumented("ReentrantLock");
    let _ = lock
        .set_pre_create_method(VALIDATE_UNLOCKED_HOOK)
        .set_on_load(OnLoad::CallConstructor);

    let mut lock_sync = pre_instrumented("ReentrantLock$Sync");
    let _ = lock_sync
        .set_honor_transient(true)
        .set_custom_rewriter(AQS_SUBCLASS_REWRITER);

    let mut lock_fair = pre_instrumented("ReentrantLock$FairSync");
    let _ = lock_fair.set_on_load(OnLoad::CallConstructor);

    let mut aqs = pre_instrumented("AbstractQueuedSynchronizer");
    let _ = aqs
        .set_honor_transient(true)
        .add_transient("state")
        .set_mode(TransformMode::AdaptableOnly)
        .set_custom_rewriter(AQS_REWRITER);

    let mut aos = pre_instrumented("AbstractOwnableSynchronizer");
    let _ = aos.set_mode(TransformMode::AdaptableOnly);

    vec![
        rw_lock, read_lock, write_lock, rw_sync, rw_fair, lock, lock_sync, lock_fair, aqs, aos,
    ]
}

/// Register every built-in default with `engine`.
///
/// Types that already have a spec keep it.
pub fn install(engine: &PolicyEngine) {
    for pattern in PERMANENT_EXCLUDES {
        engine.add_permanent_exclude(*pattern);
    }
    for pattern in NON_PORTABLE {
        engine.add_non_portable(*pattern);
    }
    for pattern in AUTOLOCK_EXCLUDES {
        engine.add_autolock_exclude(*pattern);
    }
    for pattern in WRITE_AUTOLOCKS {
        engine.add_autolock(*pattern, LockLevel::Write, Some(BUILTIN_PROVENANCE));
    }

    let mut installed = 0_usize;
    for spec in builtin_specs() {
        let name = spec.name().clone();
        if engine.add_spec_if_absent(spec) {
            installed += 1;
        } else {
            debug!(type_name = %name, "Keeping existing spec over built-in");
        }
    }
    debug!(specs = installed, "Built-in defaults installed");
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use meld_core::{MemberDescriptor, Modifiers, TypeDescriptor};

    use super::*;
    use crate::decision::DecisionReason;

    fn installed() -> PolicyEngine {
        let engine = PolicyEngine::default();
        install(&engine);
        engine
    }

    #[test]
    fn spec_names_are_unique() {
        let specs = builtin_specs();
        let names: HashSet<String> = specs.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names.len(), specs.len());
    }

    #[test]
    fn pre_instrumented_listing() {
        let mut names: Vec<String> = builtin_specs()
            .into_iter()
            .filter(ClassSpec::is_pre_instrumented)
            .map(|s| s.name().to_string())
            .collect();
        names.sort();
        insta::assert_snapshot!(names.join("\n"), @r"
        java.util.concurrent.locks.AbstractOwnableSynchronizer
        java.util.concurrent.locks.AbstractQueuedSynchronizer
        java.util.concurrent.locks.ReentrantLock
        java.util.concurrent.locks.ReentrantLock$FairSync
        java.util.concurrent.locks.ReentrantLock$Sync
        java.util.concurrent.locks.ReentrantReadWriteLock
        java.util.concurrent.locks.ReentrantReadWriteLock$FairSync
        java.util.concurrent.locks.ReentrantReadWriteLock$ReadLock
        java.util.concurrent.locks.ReentrantReadWriteLock$Sync
        java.util.concurrent.locks.ReentrantReadWriteLock$WriteLock
        ");
    }

    #[test]
    fn native_resource_types_excluded() {
        let engine = installed();
        engine.add_include_pattern("java..*");
        for name in ["java.lang.Thread", "java.net.Socket", "java.nio.channels.FileChannel"] {
            let decision = engine.explain(&TypeDescriptor::new(name)).unwrap();
            assert!(!decision.transformable, "{name}");
            assert_eq!(decision.reason, DecisionReason::PermanentlyExcluded);
        }
        assert!(engine
            .is_never_adaptable(&TypeDescriptor::new("org.jboss.net.protocol.file.Handler"))
            .unwrap());
    }

    #[test]
    fn logical_collections() {
        let engine = installed();
        assert!(engine.is_logical("java.util.HashMap"));
        assert_eq!(
            engine.change_applicator_for("java.util.TreeMap").as_deref(),
            Some("TreeMapApplicator")
        );
        let decision_type = TypeDescriptor::new("java.util.IdentityHashMap");
        let decision = engine.decide(&decision_type).unwrap();
        let clear = MemberDescriptor::new("java.util.IdentityHashMap", "clear");
        assert_eq!(decision.member_behavior(&clear), Some(&MemberBehavior::AlwaysLog));
    }

    #[test]
    fn synchronizer_subclasses_are_adaptable_only() {
        let engine = installed();
        let sync = TypeDescriptor::new("com.acme.Latch$Sync").with_ancestors([
            "java.util.concurrent.locks.AbstractQueuedSynchronizer",
            "java.util.concurrent.locks.AbstractOwnableSynchronizer",
            "java.lang.Object",
        ]);
        engine.update_spec("com.acme.Latch$Sync", |_| ());
        assert_eq!(engine.mode_for(&sync).unwrap(), TransformMode::AdaptableOnly);
    }

    #[test]
    fn lock_types_validate_before_create() {
        let engine = installed();
        let lock = TypeDescriptor::new("java.util.concurrent.locks.ReentrantLock");
        let decision = engine.decide(&lock).unwrap();
        assert!(decision.is_pre_instrumented());
        assert_eq!(decision.pre_create_method(), Some(VALIDATE_UNLOCKED_HOOK));
        assert!(decision.is_call_constructor_on_load());
    }

    #[test]
    fn properties_autolocked_throwable_not() {
        let engine = installed();
        let put = MemberDescriptor::new("java.util.Properties", "setProperty")
            .with_modifiers(Modifiers::PUBLIC | Modifiers::SYNCHRONIZED);
        assert!(engine.is_lock_method(&put).unwrap());
        let definition = engine.autolock_definition_for(&put).unwrap().unwrap();
        assert_eq!(definition.provenance(), Some(BUILTIN_PROVENANCE));

        engine.add_write_autolock("synchronized * java.lang.Throwable.*(..)");
        let fill = MemberDescriptor::new("java.lang.Throwable", "fillInStackTrace")
            .with_modifiers(Modifiers::PUBLIC | Modifiers::SYNCHRONIZED);
        assert!(!engine.is_lock_method(&fill).unwrap());
    }

    #[test]
    fn object_calls_constructor_on_load() {
        let engine = installed();
        assert!(engine
            .is_call_constructor_on_load(&TypeDescriptor::new("java.lang.Object"))
            .unwrap());
    }

    #[test]
    fn install_keeps_existing_specs() {
        let engine = PolicyEngine::default();
        engine.add_spec(ClassSpec::new("java.util.HashMap"));
        install(&engine);
        assert!(!engine.is_logical("java.util.HashMap"));
        assert!(engine.is_logical("java.util.TreeMap"));
    }
}
