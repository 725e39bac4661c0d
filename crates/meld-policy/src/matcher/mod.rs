//! Pattern matching boundary.
//!
//! The engine never interprets rule expressions itself. It hands a pattern
//! and a candidate to a [`PatternMatcher`] and only orders and combines the
//! answers. [`ExpressionMatcher`] is the default implementation.

mod expression;

pub use expression::ExpressionMatcher;

use meld_core::{MemberDescriptor, TypeDescriptor};
use thiserror::Error;

/// A rule expression that could not be evaluated.
///
/// Never treated as "no match": callers propagate it.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PatternError {
    /// The expression was empty or whitespace.
    #[error("empty pattern")]
    Empty,
    /// The expression does not follow the grammar.
    #[error("malformed pattern `{pattern}`: {reason}")]
    Malformed {
        /// The expression as given.
        pattern: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl PatternError {
    pub(crate) fn malformed(pattern: &str, reason: impl Into<String>) -> Self {
        Self::Malformed {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

/// Evaluates rule expressions against type and member descriptors.
pub trait PatternMatcher: Send + Sync {
    /// Whether `pattern` matches the type.
    fn match_type(&self, pattern: &str, candidate: &TypeDescriptor) -> Result<bool, PatternError>;

    /// Whether `pattern` matches the member.
    fn match_member(
        &self,
        pattern: &str,
        candidate: &MemberDescriptor,
    ) -> Result<bool, PatternError>;
}
