//! Distributed method call registrations.
//!
//! A distributed method is invoked on every node that holds the shared
//! instance, not just the caller's. Registrations are consulted in the order
//! they were added; the first match wins.

use meld_core::MemberDescriptor;
use serde::{Deserialize, Serialize};

use crate::matcher::{PatternError, PatternMatcher};

/// A member pattern whose calls are replayed across the cluster.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributedMethodSpec {
    /// Member pattern.
    pub method_expression: String,
    /// Run on all nodes, including ones that have not faulted the instance in.
    pub run_on_all_nodes: bool,
}

impl DistributedMethodSpec {
    /// A registration that runs on every node.
    pub fn new(method_expression: impl Into<String>) -> Self {
        Self {
            method_expression: method_expression.into(),
            run_on_all_nodes: true,
        }
    }

    /// Restrict the call to nodes where the instance is resident.
    #[must_use]
    pub fn resident_only(mut self) -> Self {
        self.run_on_all_nodes = false;
        self
    }
}

/// Distributed method registrations.
#[derive(Debug, Default)]
pub struct DistributedMethods {
    specs: Vec<DistributedMethodSpec>,
}

impl DistributedMethods {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a distributed method.
    pub fn add(&mut self, spec: DistributedMethodSpec) {
        self.specs.push(spec);
    }

    /// Number of registrations.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// The registration applying to `member`.
    ///
    /// Static members and initializers are never distributed.
    pub fn lookup(
        &self,
        matcher: &dyn PatternMatcher,
        member: &MemberDescriptor,
    ) -> Result<Option<DistributedMethodSpec>, PatternError> {
        if member.modifiers.is_static() || member.is_initializer() {
            return Ok(None);
        }
        for spec in &self.specs {
            if matcher.match_member(&spec.method_expression, member)? {
                return Ok(Some(spec.clone()));
            }
        }
        Ok(None)
    }
}
