//! Lock definitions and the lock policy resolver.
//!
//! A [`LockDefinition`] is built, then committed, then shared. Reading an
//! uncommitted definition or writing a committed one panics.
//!
//! Lock rules are consulted most recently registered first. Every matching
//! named lock applies; at most one autolock applies, the first one found,
//! and only when no autolock-exclusion pattern matches the member.

use std::sync::Arc;

use meld_core::MemberDescriptor;
use serde::{Deserialize, Serialize};

use crate::matcher::{PatternError, PatternMatcher};

/// Name shared by every autolock definition.
pub const AUTOLOCK_NAME: &str = "autolock";

/// Lock level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LockLevel {
    /// Shared read.
    Read,
    /// Exclusive write.
    Write,
    /// No mutual exclusion, changes still batched.
    Concurrent,
    /// Write acknowledged by the cluster before release.
    SynchronousWrite,
    /// Read, applied even to unsynchronized members.
    AutoSynchronizedRead,
    /// Write, applied even to unsynchronized members.
    AutoSynchronizedWrite,
    /// Concurrent, applied even to unsynchronized members.
    AutoSynchronizedConcurrent,
    /// Synchronous write, applied even to unsynchronized members.
    AutoSynchronizedSynchronousWrite,
}

impl LockLevel {
    /// Whether this is one of the auto-synchronized variants.
    pub fn is_auto_synchronized(self) -> bool {
        matches!(
            self,
            Self::AutoSynchronizedRead
                | Self::AutoSynchronizedWrite
                | Self::AutoSynchronizedConcurrent
                | Self::AutoSynchronizedSynchronousWrite
        )
    }

    /// The auto-synchronized variant of this level.
    pub fn auto_synchronized(self) -> Self {
        match self {
            Self::Read | Self::AutoSynchronizedRead => Self::AutoSynchronizedRead,
            Self::Write | Self::AutoSynchronizedWrite => Self::AutoSynchronizedWrite,
            Self::Concurrent | Self::AutoSynchronizedConcurrent => {
                Self::AutoSynchronizedConcurrent
            }
            Self::SynchronousWrite | Self::AutoSynchronizedSynchronousWrite => {
                Self::AutoSynchronizedSynchronousWrite
            }
        }
    }
}

impl std::fmt::Display for LockLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Concurrent => "concurrent",
            Self::SynchronousWrite => "synchronous-write",
            Self::AutoSynchronizedRead => "auto-synchronized-read",
            Self::AutoSynchronizedWrite => "auto-synchronized-write",
            Self::AutoSynchronizedConcurrent => "auto-synchronized-concurrent",
            Self::AutoSynchronizedSynchronousWrite => "auto-synchronized-synchronous-write",
        })
    }
}

/// A named lock or an autolock, with a build-then-commit lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LockDefinition {
    name: String,
    level: LockLevel,
    provenance: Option<String>,
    committed: bool,
}

impl LockDefinition {
    /// An uncommitted named lock.
    pub fn new(name: impl Into<String>, level: LockLevel) -> Self {
        Self {
            name: name.into(),
            level,
            provenance: None,
            committed: false,
        }
    }

    /// An uncommitted autolock.
    pub fn autolock(level: LockLevel) -> Self {
        Self::new(AUTOLOCK_NAME, level)
    }

    /// A committed autolock, ready to register.
    pub fn committed_autolock(level: LockLevel, provenance: Option<&str>) -> Arc<Self> {
        let mut definition = Self::autolock(level);
        if let Some(text) = provenance {
            definition.set_provenance(text);
        }
        definition.commit();
        Arc::new(definition)
    }

    fn assert_mutable(&self) {
        assert!(
            !self.committed,
            "lock definition `{}` is committed and cannot be modified",
            self.name
        );
    }

    fn assert_committed(&self) {
        assert!(
            self.committed,
            "lock definition `{}` read before commit",
            self.name
        );
    }

    /// Rename.
    ///
    /// # Panics
    ///
    /// If already committed.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.assert_mutable();
        self.name = name.into();
    }

    /// Change the level.
    ///
    /// # Panics
    ///
    /// If already committed.
    pub fn set_level(&mut self, level: LockLevel) {
        self.assert_mutable();
        self.level = level;
    }

    /// Record where the definition came from.
    ///
    /// # Panics
    ///
    /// If already committed.
    pub fn set_provenance(&mut self, text: impl Into<String>) {
        self.assert_mutable();
        self.provenance = Some(text.into());
    }

    /// Freeze the definition.
    ///
    /// # Panics
    ///
    /// If already committed.
    pub fn commit(&mut self) {
        self.assert_mutable();
        self.committed = true;
    }

    /// Whether [`commit`](Self::commit) was called.
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Lock name.
    ///
    /// # Panics
    ///
    /// If not committed.
    pub fn name(&self) -> &str {
        self.assert_committed();
        &self.name
    }

    /// Lock level.
    ///
    /// # Panics
    ///
    /// If not committed.
    pub fn level(&self) -> LockLevel {
        self.assert_committed();
        self.level
    }

    /// Whether this is an autolock.
    ///
    /// # Panics
    ///
    /// If not committed.
    pub fn is_autolock(&self) -> bool {
        self.assert_committed();
        self.name == AUTOLOCK_NAME
    }

    /// Provenance text.
    ///
    /// # Panics
    ///
    /// If not committed.
    pub fn provenance(&self) -> Option<&str> {
        self.assert_committed();
        self.provenance.as_deref()
    }
}

impl std::fmt::Display for LockDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.level)?;
        if let Some(text) = &self.provenance {
            write!(f, " [{text}]")?;
        }
        Ok(())
    }
}

/// A member pattern bound to a committed lock definition.
#[derive(Clone, Debug)]
pub struct LockRule {
    /// Member pattern.
    pub pattern: String,
    /// Lock applied when the pattern matches.
    pub definition: Arc<LockDefinition>,
}

/// Lock rules and autolock exclusions.
#[derive(Debug, Default)]
pub struct LockPolicy {
    rules: Vec<LockRule>,
    autolock_excludes: Vec<String>,
}

impl LockPolicy {
    /// Empty policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a lock rule ahead of every existing one.
    ///
    /// # Panics
    ///
    /// If the definition is not committed.
    pub fn add_lock(&mut self, pattern: impl Into<String>, definition: Arc<LockDefinition>) {
        let pattern = pattern.into();
        assert!(
            definition.is_committed(),
            "lock definition for `{pattern}` must be committed before registration"
        );
        self.rules.insert(0, LockRule { pattern, definition });
    }

    /// Suppress autolocks for members matching `pattern`.
    pub fn add_autolock_exclude(&mut self, pattern: impl Into<String>) {
        self.autolock_excludes.push(pattern.into());
    }

    /// Registered rules, most recent first.
    pub fn rules(&self) -> &[LockRule] {
        &self.rules
    }

    /// Whether an autolock-exclusion pattern matches the member.
    pub fn is_autolock_excluded(
        &self,
        matcher: &dyn PatternMatcher,
        member: &MemberDescriptor,
    ) -> Result<bool, PatternError> {
        for pattern in &self.autolock_excludes {
            if matcher.match_member(pattern, member)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Lock definitions applying to the member, most recent rule first.
    pub fn lock_definitions_for(
        &self,
        matcher: &dyn PatternMatcher,
        member: &MemberDescriptor,
    ) -> Result<Vec<Arc<LockDefinition>>, PatternError> {
        let autolocks_excluded = self.is_autolock_excluded(matcher, member)?;
        let mut found_autolock = false;
        let mut definitions = Vec::new();

        for rule in &self.rules {
            if !matcher.match_member(&rule.pattern, member)? {
                continue;
            }
            if rule.definition.is_autolock() {
                if !autolocks_excluded && !found_autolock {
                    found_autolock = true;
                    definitions.push(Arc::clone(&rule.definition));
                }
            } else {
                definitions.push(Arc::clone(&rule.definition));
            }
        }
        Ok(definitions)
    }

    /// Whether the member must be rewritten with a lock.
    ///
    /// True when a named lock applies, or when an autolock applies and the
    /// member is synchronized on its instance.
    pub fn is_lock_method(
        &self,
        matcher: &dyn PatternMatcher,
        member: &MemberDescriptor,
    ) -> Result<bool, PatternError> {
        let definitions = self.lock_definitions_for(matcher, member)?;
        Ok(definitions.iter().any(|definition| {
            !definition.is_autolock() || member.modifiers.is_instance_synchronized()
        }))
    }

    /// The autolock applying to the member, if any.
    pub fn autolock_definition_for(
        &self,
        matcher: &dyn PatternMatcher,
        member: &MemberDescriptor,
    ) -> Result<Option<Arc<LockDefinition>>, PatternError> {
        Ok(self
            .lock_definitions_for(matcher, member)?
            .into_iter()
            .find(|definition| definition.is_autolock()))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
