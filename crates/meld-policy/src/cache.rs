//! Generation-tagged memo of adaptability decisions and modes.
//!
//! Every entry carries the generation observed before it was computed. A
//! lookup only serves entries tagged with the current generation, and a
//! store is dropped when the generation moved while the value was being
//! computed. [`DecisionCache::invalidate`] bumps the generation and clears
//! both maps; callers invoke it while still holding the write lock of the
//! store they modified.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use meld_core::TypeName;

use crate::decision::AdaptabilityDecision;
use crate::spec::TransformMode;

#[derive(Clone, Copy, Debug)]
struct Cached<T> {
    generation: u64,
    value: T,
}

/// Per-type memo of adaptability decisions and modes.
#[derive(Debug, Default)]
pub struct DecisionCache {
    generation: AtomicU64,
    decisions: DashMap<TypeName, Cached<AdaptabilityDecision>>,
    modes: DashMap<TypeName, Cached<TransformMode>>,
}

impl DecisionCache {
    /// Empty cache at generation zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Cached decision for `name`, if computed under `generation`.
    pub fn decision(&self, name: &TypeName, generation: u64) -> Option<AdaptabilityDecision> {
        lookup(&self.decisions, name, generation)
    }

    /// Remember a decision computed under `generation`.
    pub fn store_decision(&self, name: &TypeName, generation: u64, value: AdaptabilityDecision) {
        self.store(&self.decisions, name, generation, value);
    }

    /// Cached mode for `name`, if computed under `generation`.
    pub fn mode(&self, name: &TypeName, generation: u64) -> Option<TransformMode> {
        lookup(&self.modes, name, generation)
    }

    /// Remember a mode computed under `generation`.
    pub fn store_mode(&self, name: &TypeName, generation: u64, value: TransformMode) {
        self.store(&self.modes, name, generation, value);
    }

    /// Drop every entry and move to a new generation.
    pub fn invalidate(&self) {
        let _ = self.generation.fetch_add(1, Ordering::AcqRel);
        self.decisions.clear();
        self.modes.clear();
    }

    /// Number of cached decisions.
    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    /// Whether no decision is cached.
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    fn store<T: Copy>(
        &self,
        map: &DashMap<TypeName, Cached<T>>,
        name: &TypeName,
        generation: u64,
        value: T,
    ) {
        if generation != self.generation() {
            return;
        }
        let _ = map.insert(name.clone(), Cached { generation, value });
    }
}

fn lookup<T: Copy>(map: &DashMap<TypeName, Cached<T>>, name: &TypeName, generation: u64) -> Option<T> {
    map.get(name)
        .filter(|entry| entry.generation == generation)
        .map(|entry| entry.value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DecisionReason;

    fn included() -> AdaptabilityDecision {
        AdaptabilityDecision::new(true, DecisionReason::IncludeRule)
    }

    #[test]
    fn serves_current_generation() {
        let cache = DecisionCache::new();
        let name = TypeName::new("com.acme.Widget");
        let generation = cache.generation();
        cache.store_decision(&name, generation, included());
        cache.store_mode(&name, generation, TransformMode::FullyTransformable);

        assert_eq!(cache.decision(&name, generation), Some(included()));
        assert_eq!(cache.mode(&name, generation), Some(TransformMode::FullyTransformable));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_clears_everything() {
        let cache = DecisionCache::new();
        let name = TypeName::new("com.acme.Widget");
        cache.store_decision(&name, 0, included());
        cache.store_mode(&name, 0, TransformMode::AdaptableOnly);

        cache.invalidate();
        assert_eq!(cache.generation(), 1);
        assert!(cache.is_empty());
        assert_eq!(cache.decision(&name, 1), None);
        assert_eq!(cache.mode(&name, 1), None);
    }

    #[test]
    fn stale_store_is_dropped() {
        let cache = DecisionCache::new();
        let name = TypeName::new("com.acme.Widget");
        let observed = cache.generation();
        cache.invalidate();

        cache.store_decision(&name, observed, included());
        assert!(cache.is_empty());
        assert_eq!(cache.decision(&name, observed), None);
    }

    #[test]
    fn stale_entry_not_served() {
        let cache = DecisionCache::new();
        let name = TypeName::new("com.acme.Widget");
        cache.store_decision(&name, 0, included());
        assert_eq!(cache.decision(&name, 1), None);
    }
}
