//! # meld-policy
//!
//! Decides, for each type the class loader sees, whether and how it is
//! transformed for clustering.
//!
//! - **Rules**: ordered include/exclude rules, permanent excludes, non-portable types
//! - **Class specs**: per-type behavior, split into live and inventory partitions
//! - **Roots**: fields whose referenced object graphs are shared cluster-wide
//! - **Locks**: named locks and autolocks resolved per member
//! - **Engine**: [`PolicyEngine`] combines the registries and memoizes decisions
//! - **Inventory**: verification that pre-instrumented types were shipped
//! - **Bootstrap**: engine construction from [`meld_settings::MeldSettings`]

#![deny(unsafe_code)]

pub mod bootstrap;
pub mod builtins;
pub mod cache;
pub mod decision;
pub mod engine;
pub mod errors;
pub mod inventory;
pub mod locks;
pub mod matcher;
pub mod members;
pub mod mode;
pub mod roots;
pub mod rules;
pub mod spec;
pub mod spec_store;

pub use bootstrap::{apply_policy, bootstrap, bootstrap_with_matcher, merge_inventory};
pub use decision::{AdaptabilityDecision, ClassDecision, DecisionReason};
pub use engine::{EngineOptions, PolicyEngine};
pub use errors::{PolicyError, Result};
pub use inventory::{InventoryManifest, InventoryReport};
pub use locks::{LockDefinition, LockLevel};
pub use matcher::{ExpressionMatcher, PatternError, PatternMatcher};
pub use members::DistributedMethodSpec;
pub use roots::RootDefinition;
pub use rules::{Disposition, IncludeRule, OnLoad, Rule};
pub use spec::{ClassSpec, ConstructionBehavior, MemberBehavior, TransformMode};
