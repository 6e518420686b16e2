//! Invalidation pattern value object.
//!
//! Five pattern kinds used both for key-pattern matching during
//! invalidation and for `find_keys`-style scans.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{NeoCacheError, NeoCacheResult};

/// The kind of match a pattern performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternKind {
    /// Exact string equality.
    Exact,
    /// Prefix match.
    Prefix,
    /// Suffix match.
    Suffix,
    /// `*`/`?` wildcard match, anchored to the whole key.
    Wildcard,
    /// Regular expression, matched unanchored (like Python's `re.search`).
    Regex,
}

/// A validated invalidation pattern.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationPattern {
    text: String,
    kind: PatternKind,
    case_sensitive: bool,
    #[serde(skip)]
    compiled: Option<std::sync::Arc<Regex>>,
}

impl InvalidationPattern {
    /// Construct a pattern, compiling (and validating) regex/wildcard forms
    /// eagerly so construction fails fast on bad input.
    pub fn new(text: impl Into<String>, kind: PatternKind, case_sensitive: bool) -> NeoCacheResult<Self> {
        let text = text.into();
        if text.is_empty() {
            return Err(NeoCacheError::InvalidPattern("pattern cannot be empty".to_string()));
        }
        let compiled = match kind {
            PatternKind::Regex => Some(std::sync::Arc::new(Self::compile(&text, case_sensitive, false)?)),
            PatternKind::Wildcard => {
                let escaped = wildcard_to_regex(&text);
                Some(std::sync::Arc::new(Self::compile(&escaped, case_sensitive, true)?))
            }
            PatternKind::Exact | PatternKind::Prefix | PatternKind::Suffix => None,
        };
        Ok(Self {
            text,
            kind,
            case_sensitive,
            compiled,
        })
    }

    fn compile(pattern: &str, case_sensitive: bool, anchored: bool) -> NeoCacheResult<Regex> {
        let pattern = if anchored {
            format!("^{pattern}$")
        } else {
            pattern.to_string()
        };
        RegexBuilder::new(&pattern)
            .case_insensitive(!case_sensitive)
            .build()
            .map_err(|e| NeoCacheError::InvalidPattern(e.to_string()))
    }

    /// Exact-match pattern.
    pub fn exact(text: impl Into<String>, case_sensitive: bool) -> NeoCacheResult<Self> {
        Self::new(text, PatternKind::Exact, case_sensitive)
    }

    /// Wildcard pattern (`*`/`?`).
    pub fn wildcard(text: impl Into<String>, case_sensitive: bool) -> NeoCacheResult<Self> {
        Self::new(text, PatternKind::Wildcard, case_sensitive)
    }

    /// Regular-expression pattern.
    pub fn regex(text: impl Into<String>, case_sensitive: bool) -> NeoCacheResult<Self> {
        Self::new(text, PatternKind::Regex, case_sensitive)
    }

    /// Prefix pattern.
    pub fn prefix(text: impl Into<String>, case_sensitive: bool) -> NeoCacheResult<Self> {
        Self::new(text, PatternKind::Prefix, case_sensitive)
    }

    /// Suffix pattern.
    pub fn suffix(text: impl Into<String>, case_sensitive: bool) -> NeoCacheResult<Self> {
        Self::new(text, PatternKind::Suffix, case_sensitive)
    }

    /// All keys under `user:{user_id}:`.
    pub fn user_keys(user_id: &str) -> NeoCacheResult<Self> {
        Self::prefix(format!("user:{user_id}:"), true)
    }

    /// All keys under `tenant:{tenant_id}:`.
    pub fn tenant_keys(tenant_id: &str) -> NeoCacheResult<Self> {
        Self::prefix(format!("tenant:{tenant_id}:"), true)
    }

    /// All keys under `session:{session_id}:`.
    pub fn session_keys(session_id: &str) -> NeoCacheResult<Self> {
        Self::prefix(format!("session:{session_id}:"), true)
    }

    /// Pattern kind.
    pub fn kind(&self) -> PatternKind {
        self.kind
    }

    /// Raw pattern text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether `key` matches this pattern.
    ///
    /// `Wildcard` matching is anchored to the whole key (`^...$`).
    /// `Regex` matching is deliberately unanchored, mirroring the
    /// original source's use of `re.search` rather than `re.match` — a
    /// regex pattern of `"profile"` matches `"user:1:profile"`.
    pub fn matches(&self, key: &str) -> bool {
        let (key, text) = if self.case_sensitive {
            (key.to_string(), self.text.clone())
        } else {
            (key.to_lowercase(), self.text.to_lowercase())
        };
        match self.kind {
            PatternKind::Exact => key == text,
            PatternKind::Prefix => key.starts_with(&text),
            PatternKind::Suffix => key.ends_with(&text),
            PatternKind::Wildcard | PatternKind::Regex => self
                .compiled
                .as_ref()
                .map(|re| re.is_match(&key))
                .unwrap_or(false),
        }
    }

    /// Heuristic selectivity estimate in `[0.0, 1.0]`; lower is more
    /// selective (matches fewer keys).
    pub fn estimate_selectivity(&self) -> f64 {
        match self.kind {
            PatternKind::Exact => 0.0,
            PatternKind::Prefix | PatternKind::Suffix => {
                (1.0 - (self.text.len() as f64 / 100.0)).max(0.1)
            }
            PatternKind::Wildcard => {
                let wildcards = self.text.matches('*').count() + self.text.matches('?').count();
                (0.2 + wildcards as f64 * 0.2).min(0.9)
            }
            PatternKind::Regex => 0.5,
        }
    }
}

fn wildcard_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() * 2);
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            other => out.push_str(&regex::escape(&other.to_string())),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_matches_only_identical_key() {
        let p = InvalidationPattern::exact("user:1:profile", true).unwrap();
        assert!(p.matches("user:1:profile"));
        assert!(!p.matches("user:1:profiles"));
    }

    #[test]
    fn wildcard_is_anchored() {
        let p = InvalidationPattern::wildcard("user:1:*", true).unwrap();
        assert!(p.matches("user:1:profile"));
        assert!(!p.matches("other:user:1:profile"));
    }

    #[test]
    fn regex_is_unanchored() {
        let p = InvalidationPattern::regex("profile", true).unwrap();
        assert!(p.matches("user:1:profile"));
        assert!(p.matches("profile"));
    }

    #[test]
    fn invalid_regex_is_rejected_at_construction() {
        assert!(InvalidationPattern::regex("(unterminated", true).is_err());
    }

    #[test]
    fn case_insensitive_matching() {
        let p = InvalidationPattern::exact("USER:1", false).unwrap();
        assert!(p.matches("user:1"));
    }
}
