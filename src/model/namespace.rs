//! Namespace: a named, optionally tenant-scoped policy boundary.

use serde::{Deserialize, Serialize};

use crate::error::{NeoCacheError, NeoCacheResult};
use crate::value_objects::Key;

/// Eviction policy applied when a namespace exceeds `max_entries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvictionPolicy {
    /// Evict least recently used entries first.
    Lru,
    /// Evict least frequently used entries first.
    Lfu,
    /// Evict the oldest-inserted entries first.
    Fifo,
    /// Evict entries closest to expiry first.
    Ttl,
    /// Evict lowest-priority entries first.
    Priority,
    /// Priority first, LRU recency as the tiebreak.
    Hybrid,
}

/// Per-namespace limits and defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespacePolicy {
    /// Default TTL (seconds) for entries that don't specify one.
    pub default_ttl: i64,
    /// Maximum live entries before eviction runs.
    pub max_entries: u64,
    /// Eviction policy applied when over `max_entries`.
    pub eviction_policy: EvictionPolicy,
    /// Optional memory budget in megabytes.
    pub max_memory_mb: Option<u64>,
    /// Maximum key length accepted in this namespace.
    pub max_key_length: usize,
}

impl Default for NamespacePolicy {
    fn default() -> Self {
        Self {
            default_ttl: 3600,
            max_entries: 10_000,
            eviction_policy: EvictionPolicy::Lru,
            max_memory_mb: None,
            max_key_length: crate::value_objects::key::MAX_LENGTH,
        }
    }
}

/// `(name, tenant_id?)` policy boundary.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    name: String,
    tenant_id: Option<String>,
}

impl Namespace {
    /// Construct a namespace, validating `name` per spec (1-64 chars,
    /// letter-initial, `[a-zA-Z][a-zA-Z0-9_-]*`), normalized to lowercase.
    pub fn new(name: impl Into<String>, tenant_id: Option<String>) -> NeoCacheResult<Self> {
        let name = name.into();
        if name.is_empty() || name.len() > 64 {
            return Err(NeoCacheError::NamespaceInvalid(format!(
                "namespace length {} outside [1, 64]",
                name.len()
            )));
        }
        let mut chars = name.chars();
        let first = chars.next().unwrap();
        if !first.is_ascii_alphabetic() {
            return Err(NeoCacheError::NamespaceInvalid(
                "namespace must start with a letter".to_string(),
            ));
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
            return Err(NeoCacheError::NamespaceInvalid(
                "namespace must match [a-zA-Z][a-zA-Z0-9_-]*".to_string(),
            ));
        }
        Ok(Self {
            name: name.to_lowercase(),
            tenant_id,
        })
    }

    /// Namespace name, already normalized to lowercase.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Optional tenant scope.
    pub fn tenant_id(&self) -> Option<&str> {
        self.tenant_id.as_deref()
    }

    /// Render the full storage key: `{tenant_id?}:{name}:{key}`.
    pub fn full_key(&self, key: &Key) -> String {
        format!("{}:{}", self.bucket_id(), key.as_str())
    }

    /// Render the tenant-qualified bucket identifier (`{tenant_id}:{name}`
    /// or just `{name}`), used by repository backends as the opaque
    /// `namespace` parameter so distinct tenants never collide on the
    /// same namespace name.
    pub fn bucket_id(&self) -> String {
        match &self.tenant_id {
            Some(tenant) => format!("{tenant}:{}", self.name),
            None => self.name.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_to_lowercase() {
        let ns = Namespace::new("Users", None).unwrap();
        assert_eq!(ns.name(), "users");
    }

    #[test]
    fn rejects_non_letter_initial() {
        assert!(Namespace::new("1users", None).is_err());
    }

    #[test]
    fn full_key_includes_tenant_when_present() {
        let ns = Namespace::new("users", Some("acme".to_string())).unwrap();
        let key = Key::new("42:profile").unwrap();
        assert_eq!(ns.full_key(&key), "acme:users:42:profile");
    }
}
