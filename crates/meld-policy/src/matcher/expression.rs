//! Default expression matcher.
//!
//! Supports the commonly used subset of the class/method expression syntax:
//!
//! - Type patterns: `com.acme.Widget`, `com.acme.*`, `com.acme..*`,
//!   `com.acme.Base+`. `*` matches within one name segment (nested types
//!   included), `..` spans any number of packages, a trailing `+` also
//!   matches when an ancestor or interface matches. A bare `*` matches
//!   every type.
//! - Member patterns: `[modifiers] <return> <type>.<name>(<params>)`, e.g.
//!   `synchronized * com.acme.Counter.inc*(..)`. Modifiers may be negated
//!   with `!`. Parameters are comma-separated type patterns; `..` matches
//!   any run of parameters and may appear at any position. `__INIT__`
//!   names constructors.
//!
//! Compiled patterns are cached by their source text.

use std::sync::Arc;

use dashmap::DashMap;
use meld_core::descriptors::CONSTRUCTOR_NAME;
use meld_core::{MemberDescriptor, Modifiers, TypeDescriptor};
use regex::Regex;

use super::{PatternError, PatternMatcher};

const CONSTRUCTOR_ALIAS: &str = "__INIT__";

/// Regex-backed [`PatternMatcher`] with a compiled-pattern cache.
#[derive(Default)]
pub struct ExpressionMatcher {
    types: DashMap<String, Arc<TypePattern>>,
    members: DashMap<String, Arc<MemberPattern>>,
}

impl ExpressionMatcher {
    /// Create a matcher with an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of compiled patterns held in the cache.
    pub fn compiled_count(&self) -> usize {
        self.types.len() + self.members.len()
    }

    fn type_pattern(&self, pattern: &str) -> Result<Arc<TypePattern>, PatternError> {
        if let Some(compiled) = self.types.get(pattern).map(|p| Arc::clone(p.value())) {
            return Ok(compiled);
        }
        let compiled = Arc::new(TypePattern::compile(pattern)?);
        let _ = self
            .types
            .insert(pattern.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }

    fn member_pattern(&self, pattern: &str) -> Result<Arc<MemberPattern>, PatternError> {
        if let Some(compiled) = self.members.get(pattern).map(|p| Arc::clone(p.value())) {
            return Ok(compiled);
        }
        let compiled = Arc::new(MemberPattern::compile(pattern)?);
        let _ = self
            .members
            .insert(pattern.to_string(), Arc::clone(&compiled));
        Ok(compiled)
    }
}

impl PatternMatcher for ExpressionMatcher {
    fn match_type(&self, pattern: &str, candidate: &TypeDescriptor) -> Result<bool, PatternError> {
        let compiled = self.type_pattern(pattern)?;
        if compiled.matches_name(candidate.name()) {
            return Ok(true);
        }
        Ok(compiled.include_subtypes
            && candidate
                .ancestors
                .iter()
                .chain(candidate.interfaces.iter())
                .any(|name| compiled.matches_name(name)))
    }

    fn match_member(
        &self,
        pattern: &str,
        candidate: &MemberDescriptor,
    ) -> Result<bool, PatternError> {
        Ok(self.member_pattern(pattern)?.matches(candidate))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Type patterns
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct TypePattern {
    regex: Regex,
    include_subtypes: bool,
}

impl TypePattern {
    fn compile(pattern: &str) -> Result<Self, PatternError> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(PatternError::Empty);
        }
        let (body, include_subtypes) = match trimmed.strip_suffix('+') {
            Some(body) => (body, true),
            None => (trimmed, false),
        };
        let body = body.replace('/', ".");
        validate_type_body(pattern, &body)?;

        if body == "*" {
            return Ok(Self {
                regex: build_regex(pattern, "^.*$")?,
                include_subtypes,
            });
        }

        let mut source = String::from("^");
        let mut rest = body.as_str();
        while let Some(c) = rest.chars().next() {
            if let Some(after) = rest.strip_prefix("..") {
                if source.len() == 1 {
                    source.push_str(r"(?:[^.]+\.)*");
                } else {
                    source.push_str(r"\.(?:[^.]+\.)*");
                }
                rest = after;
            } else {
                match c {
                    '.' => source.push_str(r"\."),
                    '*' => source.push_str("[^.]*"),
                    other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
                }
                rest = &rest[c.len_utf8()..];
            }
        }
        source.push('$');

        Ok(Self {
            regex: build_regex(pattern, &source)?,
            include_subtypes,
        })
    }

    fn matches_name(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }
}

fn validate_type_body(pattern: &str, body: &str) -> Result<(), PatternError> {
    if body.is_empty() {
        return Err(PatternError::malformed(pattern, "missing type name"));
    }
    if let Some(bad) = body.chars().find(|c| !is_type_char(*c)) {
        return Err(PatternError::malformed(
            pattern,
            format!("illegal character `{bad}`"),
        ));
    }
    if body.contains("...")
        || body.ends_with('.')
        || (body.starts_with('.') && !body.starts_with(".."))
    {
        return Err(PatternError::malformed(pattern, "empty name segment"));
    }
    Ok(())
}

fn is_type_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '$' | '*' | '.' | '[' | ']')
}

fn build_regex(pattern: &str, source: &str) -> Result<Regex, PatternError> {
    Regex::new(source).map_err(|e| PatternError::malformed(pattern, e.to_string()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Member patterns
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
enum ParamPattern {
    AnySequence,
    Type(TypePattern),
}

#[derive(Debug)]
struct MemberPattern {
    required: Modifiers,
    forbidden: Modifiers,
    return_type: TypePattern,
    declaring_type: TypePattern,
    name: Regex,
    params: Vec<ParamPattern>,
}

impl MemberPattern {
    fn compile(pattern: &str) -> Result<Self, PatternError> {
        let trimmed = pattern.trim();
        if trimmed.is_empty() {
            return Err(PatternError::Empty);
        }

        let open = trimmed
            .find('(')
            .ok_or_else(|| PatternError::malformed(pattern, "missing parameter list"))?;
        if !trimmed.ends_with(')') || trimmed[open + 1..].contains('(') {
            return Err(PatternError::malformed(
                pattern,
                "parameter list must close the pattern",
            ));
        }
        let head = &trimmed[..open];
        let param_source = &trimmed[open + 1..trimmed.len() - 1];

        let tokens: Vec<&str> = head.split_whitespace().collect();
        let Some((qualified, rest)) = tokens.split_last() else {
            return Err(PatternError::malformed(pattern, "missing member name"));
        };
        let Some((return_type, modifier_tokens)) = rest.split_last() else {
            return Err(PatternError::malformed(pattern, "missing return type"));
        };
        let (declaring, name) = qualified.rsplit_once('.').ok_or_else(|| {
            PatternError::malformed(pattern, "member name must be qualified by a type")
        })?;

        let (required, forbidden) = parse_modifiers(pattern, modifier_tokens)?;

        Ok(Self {
            required,
            forbidden,
            return_type: TypePattern::compile(return_type)?,
            declaring_type: TypePattern::compile(declaring)?,
            name: compile_name(pattern, name)?,
            params: parse_params(pattern, param_source)?,
        })
    }

    fn matches(&self, member: &MemberDescriptor) -> bool {
        member.modifiers.contains(self.required)
            && member.modifiers.bits() & self.forbidden.bits() == 0
            && self.name.is_match(&member.name)
            && self.declaring_type.matches_name(&member.declaring_type)
            && self.return_type.matches_name(&member.return_type)
            && params_match(&self.params, &member.parameter_types)
    }
}

fn parse_modifiers(pattern: &str, tokens: &[&str]) -> Result<(Modifiers, Modifiers), PatternError> {
    let mut required = Modifiers::NONE;
    let mut forbidden = Modifiers::NONE;
    for token in tokens {
        let (negated, word) = match token.strip_prefix('!') {
            Some(word) => (true, word),
            None => (false, *token),
        };
        let flag = match word {
            "public" => Modifiers::PUBLIC,
            "private" => Modifiers::PRIVATE,
            "protected" => Modifiers::PROTECTED,
            "static" => Modifiers::STATIC,
            "final" => Modifiers::FINAL,
            "synchronized" => Modifiers::SYNCHRONIZED,
            "native" => Modifiers::NATIVE,
            "abstract" => Modifiers::ABSTRACT,
            other => {
                return Err(PatternError::malformed(
                    pattern,
                    format!("unknown modifier `{other}`"),
                ));
            }
        };
        if negated {
            forbidden = forbidden | flag;
        } else {
            required = required | flag;
        }
    }
    Ok((required, forbidden))
}

fn compile_name(pattern: &str, name: &str) -> Result<Regex, PatternError> {
    let name = if name == CONSTRUCTOR_ALIAS {
        CONSTRUCTOR_NAME
    } else {
        name
    };
    if name.is_empty() {
        return Err(PatternError::malformed(pattern, "missing member name"));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_alphanumeric() || matches!(c, '_' | '$' | '*' | '<' | '>')))
    {
        return Err(PatternError::malformed(
            pattern,
            format!("illegal character `{bad}` in member name"),
        ));
    }
    let source = name
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    build_regex(pattern, &format!("^{source}$"))
}

fn parse_params(pattern: &str, source: &str) -> Result<Vec<ParamPattern>, PatternError> {
    if source.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut params = source
        .split(',')
        .map(str::trim)
        .map(|param| match param {
            "" => Err(PatternError::malformed(pattern, "empty parameter")),
            ".." => Ok(ParamPattern::AnySequence),
            _ => TypePattern::compile(param).map(ParamPattern::Type),
        })
        .collect::<Result<Vec<_>, _>>()?;
    params.dedup_by(|a, b| {
        matches!(a, ParamPattern::AnySequence) && matches!(b, ParamPattern::AnySequence)
    });
    Ok(params)
}

/// Matches in one pass over the pattern, tracking which prefixes of
/// `params` the pattern consumed so far can end at.
fn params_match(patterns: &[ParamPattern], params: &[String]) -> bool {
    let mut reachable = vec![false; params.len() + 1];
    reachable[0] = true;
    for pattern in patterns {
        match pattern {
            ParamPattern::AnySequence => {
                let mut seen = false;
                for slot in &mut reachable {
                    seen |= *slot;
                    *slot = seen;
                }
            }
            ParamPattern::Type(expected) => {
                for end in (1..=params.len()).rev() {
                    reachable[end] = reachable[end - 1] && expected.matches_name(&params[end - 1]);
                }
                reachable[0] = false;
            }
        }
        if !reachable.contains(&true) {
            return false;
        }
    }
    reachable[params.len()]
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn ty(name: &str) -> TypeDescriptor {
        TypeDescriptor::new(name)
    }

    fn matches_type(pattern: &str, name: &str) -> bool {
        ExpressionMatcher::new().match_type(pattern, &ty(name)).unwrap()
    }

    fn counter_increment() -> MemberDescriptor {
        MemberDescriptor::new("com.acme.Counter", "increment")
            .with_modifiers(Modifiers::PUBLIC | Modifiers::SYNCHRONIZED)
            .returning("int")
            .with_parameters(["int"])
    }

    fn matches_member(pattern: &str, member: &MemberDescriptor) -> bool {
        ExpressionMatcher::new().match_member(pattern, member).unwrap()
    }

    // ── type patterns ───────────────────────────────────────────────

    #[test]
    fn exact_type() {
        assert!(matches_type("java.lang.Thread", "java.lang.Thread"));
        assert!(!matches_type("java.lang.Thread", "java.lang.ThreadGroup"));
    }

    #[test]
    fn star_stays_within_segment() {
        assert!(matches_type("com.acme.*", "com.acme.Widget"));
        assert!(matches_type("com.acme.*", "com.acme.Widget$Part"));
        assert!(!matches_type("com.acme.*", "com.acme.sub.Widget"));
        assert!(!matches_type("com.acme.*", "org.other.Thing"));
    }

    #[test]
    fn double_dot_spans_packages() {
        assert!(matches_type("com.acme..*", "com.acme.Widget"));
        assert!(matches_type("com.acme..*", "com.acme.deep.sub.Widget"));
        assert!(!matches_type("com.acme..*", "com.acmex.Widget"));
        assert!(matches_type("..*Impl", "org.x.ServiceImpl"));
    }

    #[test]
    fn bare_star_matches_everything() {
        assert!(matches_type("*", "Toplevel"));
        assert!(matches_type("*", "com.acme.Widget"));
    }

    #[test]
    fn slash_form_pattern() {
        assert!(matches_type("java/util/HashMap", "java.util.HashMap"));
    }

    #[test]
    fn plus_matches_subtypes() {
        let matcher = ExpressionMatcher::new();
        let sub = ty("com.acme.Special")
            .with_ancestors(["com.acme.Base", "java.lang.Object"])
            .with_interfaces(["java.io.Serializable"]);
        assert!(matcher.match_type("com.acme.Base+", &sub).unwrap());
        assert!(matcher.match_type("java.io.Serializable+", &sub).unwrap());
        assert!(!matcher.match_type("com.acme.Base", &sub).unwrap());
        assert!(!matcher.match_type("com.acme.Other+", &sub).unwrap());
    }

    #[test]
    fn malformed_type_patterns() {
        let matcher = ExpressionMatcher::new();
        let candidate = ty("a.B");
        assert_matches!(matcher.match_type("", &candidate), Err(PatternError::Empty));
        assert_matches!(matcher.match_type("   ", &candidate), Err(PatternError::Empty));
        assert_matches!(
            matcher.match_type("com.acme.(Widget", &candidate),
            Err(PatternError::Malformed { .. })
        );
        assert_matches!(
            matcher.match_type("com.acme.", &candidate),
            Err(PatternError::Malformed { .. })
        );
        assert_matches!(
            matcher.match_type("com...acme", &candidate),
            Err(PatternError::Malformed { .. })
        );
        assert_matches!(matcher.match_type("+", &candidate), Err(PatternError::Malformed { .. }));
    }

    // ── member patterns ─────────────────────────────────────────────

    #[test]
    fn wildcard_return_and_params() {
        let m = counter_increment();
        assert!(matches_member("* com.acme.Counter.increment(..)", &m));
        assert!(matches_member("int com.acme.Counter.inc*(int)", &m));
        assert!(!matches_member("void com.acme.Counter.increment(..)", &m));
        assert!(!matches_member("* com.acme.Counter.decrement(..)", &m));
        assert!(!matches_member("* com.acme.Gauge.increment(..)", &m));
    }

    #[test]
    fn modifiers_required_and_negated() {
        let m = counter_increment();
        assert!(matches_member("synchronized * com.acme.Counter.*(..)", &m));
        assert!(matches_member("public !static * com.acme.Counter.*(..)", &m));
        assert!(!matches_member("static * com.acme.Counter.*(..)", &m));
        assert!(!matches_member("!synchronized * com.acme.Counter.*(..)", &m));
    }

    #[test]
    fn parameter_lists() {
        let m = MemberDescriptor::new("com.acme.Store", "put")
            .returning("java.lang.Object")
            .with_parameters(["java.lang.String", "int", "java.lang.Object"]);
        assert!(matches_member("* com.acme.Store.put(..)", &m));
        assert!(matches_member("* com.acme.Store.put(java.lang.String, ..)", &m));
        assert!(matches_member("* com.acme.Store.put(.., java.lang.Object)", &m));
        assert!(matches_member("* com.acme.Store.put(java.lang.*, .., *)", &m));
        assert!(matches_member("* com.acme.Store.put(*, int, *)", &m));
        assert!(!matches_member("* com.acme.Store.put()", &m));
        assert!(!matches_member("* com.acme.Store.put(int, ..)", &m));
        assert!(!matches_member("* com.acme.Store.put(*, *)", &m));
        assert!(matches_member("* com.acme.Store.put(.., int, ..)", &m));
        assert!(!matches_member("* com.acme.Store.put(.., int, .., int, ..)", &m));
    }

    #[test]
    fn repeated_any_sequences_stay_linear() {
        let params = vec!["java.lang.String"; 64];
        let m = MemberDescriptor::new("com.acme.Store", "putAll").with_parameters(params);
        let pattern = format!("* com.acme.Store.putAll({}int)", ".., *, ".repeat(12));
        assert!(!matches_member(&pattern, &m));
        let pattern = format!("* com.acme.Store.putAll({}..)", ".., *, ".repeat(12));
        assert!(matches_member(&pattern, &m));
        assert!(matches_member("* com.acme.Store.putAll(.., .., .., ..)", &m));
    }

    #[test]
    fn empty_parameter_list() {
        let m = MemberDescriptor::new("com.acme.Store", "clear");
        assert!(matches_member("void com.acme.Store.clear()", &m));
        assert!(matches_member("void com.acme.Store.clear(..)", &m));
    }

    #[test]
    fn constructor_alias() {
        let ctor = MemberDescriptor::new("com.acme.Store", CONSTRUCTOR_NAME);
        assert!(matches_member("* com.acme.Store.__INIT__(..)", &ctor));
    }

    #[test]
    fn declaring_type_uses_type_grammar() {
        let m = counter_increment();
        assert!(matches_member("* com..*.increment(..)", &m));
        assert!(matches_member("* com.acme.Counter+.increment(..)", &m));
    }

    #[test]
    fn malformed_member_patterns() {
        let matcher = ExpressionMatcher::new();
        let m = counter_increment();
        assert_matches!(matcher.match_member("", &m), Err(PatternError::Empty));
        for bad in [
            "* com.acme.Counter.increment",
            "com.acme.Counter.increment(..)",
            "* increment(..)",
            "volatile * com.acme.Counter.increment(..)",
            "* com.acme.Counter.increment(..) extra",
            "* com.acme.Counter.incr-ement(..)",
            "* com.acme.Counter.increment(int,,int)",
        ] {
            assert_matches!(
                matcher.match_member(bad, &m),
                Err(PatternError::Malformed { .. }),
                "pattern {bad}"
            );
        }
    }

    #[test]
    fn compiled_patterns_are_cached() {
        let matcher = ExpressionMatcher::new();
        let m = counter_increment();
        for _ in 0..3 {
            assert!(matcher.match_member("* com.acme.Counter.*(..)", &m).unwrap());
            assert!(matcher.match_type("com.acme.*", &ty("com.acme.X")).unwrap());
        }
        assert_eq!(matcher.compiled_count(), 2);
    }

    #[test]
    fn errors_are_not_cached() {
        let matcher = ExpressionMatcher::new();
        assert!(matcher.match_type("bad pattern", &ty("a.B")).is_err());
        assert!(matcher.match_type("bad pattern", &ty("a.B")).is_err());
        assert_eq!(matcher.compiled_count(), 0);
    }
}
