//! Cache key value object.
//!
//! Immutable, validated, hierarchical key. Ported from the original
//! Python `CacheKey` dataclass: colon-separated segments, a fixed
//! character set, and length bounds.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{NeoCacheError, NeoCacheResult};

/// Maximum key length in bytes.
pub const MAX_LENGTH: usize = 250;
/// Minimum key length in bytes.
pub const MIN_LENGTH: usize = 1;

static VALID_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._:/-]+$").expect("static pattern is valid"));

/// A validated, immutable cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Key(String);

impl Key {
    /// Validate and wrap a raw string as a [`Key`].
    pub fn new(value: impl Into<String>) -> NeoCacheResult<Self> {
        let value = value.into();
        if value.len() < MIN_LENGTH || value.len() > MAX_LENGTH {
            return Err(NeoCacheError::KeyInvalid(format!(
                "key length {} outside [{MIN_LENGTH}, {MAX_LENGTH}]",
                value.len()
            )));
        }
        if !VALID_PATTERN.is_match(&value) {
            return Err(NeoCacheError::KeyInvalid(
                "key contains characters outside [A-Za-z0-9._:/-]".to_string(),
            ));
        }
        Ok(Self(value))
    }

    /// Join non-empty parts with `:` and validate the result.
    pub fn from_parts(parts: &[&str]) -> NeoCacheResult<Self> {
        let joined = parts
            .iter()
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join(":");
        if joined.is_empty() {
            return Err(NeoCacheError::KeyInvalid("no valid parts provided".to_string()));
        }
        Self::new(joined)
    }

    /// Build a user-scoped key: `user:{user_id}:{key}`.
    pub fn user_key(user_id: &str, key: &str) -> NeoCacheResult<Self> {
        Self::from_parts(&["user", user_id, key])
    }

    /// Build a tenant-scoped key: `tenant:{tenant_id}:{key}`.
    pub fn tenant_key(tenant_id: &str, key: &str) -> NeoCacheResult<Self> {
        Self::from_parts(&["tenant", tenant_id, key])
    }

    /// Build a session-scoped key: `session:{session_id}:{key}`.
    pub fn session_key(session_id: &str, key: &str) -> NeoCacheResult<Self> {
        Self::from_parts(&["session", session_id, key])
    }

    /// Underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Colon-separated segments.
    pub fn parts(&self) -> Vec<&str> {
        self.0.split(':').collect()
    }

    /// First segment, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.parts().first().copied()
    }

    /// Number of colon-separated segments.
    pub fn depth(&self) -> usize {
        self.parts().len()
    }

    /// Whether the key begins with `prefix`.
    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    /// Whether the key ends with `suffix`.
    pub fn ends_with(&self, suffix: &str) -> bool {
        self.0.ends_with(suffix)
    }

    /// Whether the key contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.0.contains(needle)
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_boundary_lengths() {
        assert!(Key::new("a").is_ok());
        assert!(Key::new("a".repeat(MAX_LENGTH)).is_ok());
    }

    #[test]
    fn rejects_out_of_bounds_lengths() {
        assert!(Key::new("").is_err());
        assert!(Key::new("a".repeat(MAX_LENGTH + 1)).is_err());
    }

    #[test]
    fn rejects_invalid_characters() {
        assert!(Key::new("user profile").is_err());
        assert!(Key::new("user<1>").is_err());
    }

    #[test]
    fn hierarchy_helpers() {
        let k = Key::user_key("42", "profile").unwrap();
        assert_eq!(k.as_str(), "user:42:profile");
        assert_eq!(k.depth(), 3);
        assert_eq!(k.prefix(), Some("user"));
        assert!(k.starts_with("user:42"));
    }
}
