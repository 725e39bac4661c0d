//! Engine construction from settings.
//!
//! Configuration is applied in a fixed order, and later registrations take
//! precedence over earlier ones:
//!
//! 1. built-in library defaults (unless `policy.includeBuiltins` is off)
//! 2. user settings; `policy.instrumentedClasses` is registered as one
//!    block, so the first entry in the file is the first rule consulted
//! 3. inventory type names, as inventory-partition specs for types that do
//!    not already have one

use std::path::Path;
use std::sync::Arc;

use meld_settings::{
    InstrumentedClass, LockLevelSetting, LockSetting, MeldSettings, OnLoadSetting, PolicySettings,
    RuleKind, split_qualified_field,
};
use tracing::{debug, info};

use crate::builtins;
use crate::engine::{EngineOptions, PolicyEngine};
use crate::errors::Result;
use crate::inventory::InventoryManifest;
use crate::locks::{LockDefinition, LockLevel};
use crate::matcher::{ExpressionMatcher, PatternMatcher};
use crate::members::DistributedMethodSpec;
use crate::roots::RootDefinition;
use crate::rules::{IncludeRule, OnLoad, Rule};
use crate::spec::ClassSpec;

/// Build an engine from loaded settings with the default matcher.
///
/// Loads the inventory manifest when one is configured, and fails with
/// [`PolicyError::IncompleteInventory`](crate::PolicyError::IncompleteInventory)
/// when `inventory.verifyOnStart` is set and pre-instrumented types are
/// missing from it.
pub fn bootstrap(settings: &MeldSettings) -> Result<PolicyEngine> {
    bootstrap_with_matcher(settings, Arc::new(ExpressionMatcher::new()))
}

/// Build an engine from loaded settings.
pub fn bootstrap_with_matcher(
    settings: &MeldSettings,
    matcher: Arc<dyn PatternMatcher>,
) -> Result<PolicyEngine> {
    settings.policy.validate()?;

    let engine = PolicyEngine::with_options(
        matcher,
        EngineOptions {
            internal_namespaces: settings.policy.internal_namespaces.clone(),
            allow_dynamic_subtypes: settings.policy.allow_dynamic_subtypes,
        },
    );

    if settings.policy.include_builtins {
        builtins::install(&engine);
    }
    apply_policy(&engine, &settings.policy)?;

    if let Some(path) = &settings.inventory.manifest_path {
        let manifest = InventoryManifest::load(Path::new(path))?;
        merge_inventory(&engine, &manifest);
        if settings.inventory.verify_on_start {
            let _ = engine.verify_inventory(&manifest).into_result()?;
        }
    }

    info!(
        specs = engine.all_specs(true).len(),
        roots = engine.all_roots().len(),
        "Policy engine ready"
    );
    Ok(engine)
}

/// Register every rule in `policy` with `engine`.
pub fn apply_policy(engine: &PolicyEngine, policy: &PolicySettings) -> Result<()> {
    policy.validate()?;

    engine.add_rules_in_order(policy.instrumented_classes.iter().map(rule_from).collect());

    for pattern in &policy.permanent_excludes {
        engine.add_permanent_exclude(pattern.as_str());
    }
    for pattern in &policy.non_portable {
        engine.add_non_portable(pattern.as_str());
    }

    for lock in &policy.locks {
        engine.add_lock(lock.method_expression.as_str(), lock_definition(lock));
    }
    for pattern in &policy.autolock_excludes {
        engine.add_autolock_exclude(pattern.as_str());
    }

    for root in &policy.roots {
        let (type_name, field) = split_qualified_field(&root.field)?;
        let mut definition = RootDefinition::new(type_name, field);
        if let Some(name) = &root.name {
            definition = definition.named(name.as_str());
        }
        if let Some(is_final) = root.is_final {
            definition = definition.with_finality(is_final);
        }
        engine.add_root(definition, false)?;
    }

    for qualified in &policy.transient_fields {
        let (type_name, field) = split_qualified_field(qualified)?;
        engine.add_transient(type_name, field)?;
    }

    for method in &policy.distributed_methods {
        engine.add_distributed_method(DistributedMethodSpec {
            method_expression: method.method_expression.clone(),
            run_on_all_nodes: method.run_on_all_nodes,
        });
    }

    for (type_name, rewriter) in &policy.custom_rewriters {
        engine.add_custom_rewriter(type_name, rewriter.as_str());
    }

    if policy.allow_dynamic_subtypes {
        engine.set_allow_dynamic_subtypes(true);
    }

    debug!(
        rules = policy.instrumented_classes.len(),
        locks = policy.locks.len(),
        roots = policy.roots.len(),
        "Policy settings applied"
    );
    Ok(())
}

/// Give every inventory type without a spec an inventory-partition spec.
/// Returns how many were added.
pub fn merge_inventory(engine: &PolicyEngine, manifest: &InventoryManifest) -> usize {
    let mut added = 0;
    for name in &manifest.types {
        if engine.add_inventory_spec_if_absent(ClassSpec::new(name.clone())) {
            added += 1;
        }
    }
    debug!(added, population = manifest.len(), "Inventory merged");
    added
}

fn rule_from(entry: &InstrumentedClass) -> Rule {
    match entry.kind {
        RuleKind::Exclude => Rule::exclude(entry.class_expression.as_str()),
        RuleKind::Include => Rule::include(
            entry.class_expression.as_str(),
            IncludeRule {
                honor_transient: entry.honor_transient,
                honor_volatile: entry.honor_volatile,
                on_load: entry.on_load.as_ref().map_or(OnLoad::None, on_load_from),
            },
        ),
    }
}

fn on_load_from(setting: &OnLoadSetting) -> OnLoad {
    match setting {
        OnLoadSetting::CallConstructor => OnLoad::CallConstructor,
        OnLoadSetting::Method(method) => OnLoad::Method(method.clone()),
        OnLoadSetting::Script(script) => OnLoad::Script(script.clone()),
    }
}

fn lock_definition(setting: &LockSetting) -> Arc<LockDefinition> {
    let level = match setting.level {
        LockLevelSetting::Read => LockLevel::Read,
        LockLevelSetting::Write => LockLevel::Write,
        LockLevelSetting::Concurrent => LockLevel::Concurrent,
        LockLevelSetting::SynchronousWrite => LockLevel::SynchronousWrite,
    };
    let mut definition = match &setting.name {
        Some(name) => LockDefinition::new(name.as_str(), level),
        None if setting.auto_synchronized => LockDefinition::autolock(level.auto_synchronized()),
        None => LockDefinition::autolock(level),
    };
    if let Some(provenance) = &setting.provenance {
        definition.set_provenance(provenance.as_str());
    }
    definition.commit();
    Arc::new(definition)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
