//! Cache entry: the stored `(key, value, metadata)` record.

use chrono::{DateTime, Utc};

use crate::model::namespace::Namespace;
use crate::value_objects::{Key, Priority, SizeBytes, Ttl};

/// A stored value plus its lifecycle metadata.
///
/// Identity is `(namespace, key)`; `PartialEq` compares full storage keys
/// rather than values, matching the spec's entry-equality invariant.
#[derive(Debug, Clone)]
pub struct Entry<V> {
    /// Entry key, scoped within `namespace`.
    pub key: Key,
    /// Stored value.
    pub value: V,
    /// Optional TTL; `None` defers to the namespace's default.
    pub ttl: Option<Ttl>,
    /// Eviction priority.
    pub priority: Priority,
    /// Owning namespace.
    pub namespace: Namespace,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last access timestamp; always `>= created_at`.
    pub accessed_at: DateTime<Utc>,
    /// Monotonically nondecreasing access counter.
    pub access_count: u64,
    /// Serialized size in bytes.
    pub size_bytes: SizeBytes,
}

impl<V> Entry<V> {
    /// Construct a freshly created entry; `accessed_at` starts equal to
    /// `created_at` and `access_count` starts at zero.
    pub fn new(
        key: Key,
        value: V,
        ttl: Option<Ttl>,
        priority: Priority,
        namespace: Namespace,
        size_bytes: SizeBytes,
    ) -> Self {
        let now = Utc::now();
        Self {
            key,
            value,
            ttl,
            priority,
            namespace,
            created_at: now,
            accessed_at: now,
            access_count: 0,
            size_bytes,
        }
    }

    /// Full storage key uniquely identifying this entry.
    pub fn full_key(&self) -> String {
        self.namespace.full_key(&self.key)
    }

    /// Whether this entry is expired as of `now`, given an effective TTL
    /// (the entry's own, or the namespace default when `None`).
    pub fn is_expired_with(&self, effective_ttl: Ttl, now: DateTime<Utc>) -> bool {
        effective_ttl.is_expired(self.created_at, now)
    }

    /// Record an access: bump `access_count` and advance `accessed_at`.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.accessed_at = self.accessed_at.max(now);
        self.access_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn touch_is_monotonic() {
        let ns = Namespace::new("users", None).unwrap();
        let key = Key::new("1").unwrap();
        let mut e = Entry::new(key, "v", None, Priority::Medium, ns, SizeBytes::new(1).unwrap());
        assert_eq!(e.access_count, 0);
        e.touch(Utc::now());
        e.touch(Utc::now());
        assert_eq!(e.access_count, 2);
        assert!(e.accessed_at >= e.created_at);
    }
}
