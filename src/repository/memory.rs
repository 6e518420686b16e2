//! In-memory repository backend.
//!
//! Grounded in `tier::LruCache`/`MultiTierCache`: a `DashMap` per
//! namespace guarded by the namespace's own policy, with eviction and
//! expiry decided by scanning entry metadata (`accessed_at`,
//! `created_at`, `access_count`, `priority`, `ttl`) rather than
//! maintaining a separate ordering structure — the entry already carries
//! everything every supported eviction policy needs.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};

use super::{CacheRepository, RepositoryInfo, RepositoryStats};
use crate::error::{NeoCacheError, NeoCacheResult};
use crate::model::{Entry, EvictionPolicy, NamespacePolicy};
use crate::value_objects::{InvalidationPattern, Key, Ttl};

struct NamespaceState<V> {
    policy: RwLock<NamespacePolicy>,
    entries: DashMap<String, Entry<V>>,
}

impl<V> NamespaceState<V> {
    fn new(policy: NamespacePolicy) -> Self {
        Self {
            policy: RwLock::new(policy),
            entries: DashMap::new(),
        }
    }

    fn effective_ttl(&self, entry: &Entry<V>) -> Ttl {
        entry.ttl.unwrap_or_else(|| {
            Ttl::new(self.policy.read().default_ttl).unwrap_or_else(|_| Ttl::never_expire())
        })
    }
}

/// In-memory `CacheRepository` implementation. Ephemeral by design — the
/// specification explicitly excludes persistence across restarts for
/// this backend.
pub struct MemoryRepository<V> {
    namespaces: DashMap<String, Arc<NamespaceState<V>>>,
    default_policy: NamespacePolicy,
    /// Optional process-wide memory cap, independent of any single
    /// namespace's `max_entries` (see DESIGN.md Open Question 3).
    global_memory_cap_bytes: Option<u64>,
    stats: Mutex<RepositoryStats>,
}

impl<V> MemoryRepository<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Construct an empty repository with a default namespace policy and
    /// an optional global memory cap in bytes.
    pub fn new(default_policy: NamespacePolicy, global_memory_cap_bytes: Option<u64>) -> Self {
        Self {
            namespaces: DashMap::new(),
            default_policy,
            global_memory_cap_bytes,
            stats: Mutex::new(RepositoryStats::default()),
        }
    }

    fn namespace(&self, name: &str) -> Arc<NamespaceState<V>> {
        self.namespaces
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(NamespaceState::new(self.default_policy.clone())))
            .clone()
    }

    fn total_memory_bytes(&self) -> u64 {
        self.namespaces
            .iter()
            .flat_map(|ns| {
                ns.entries
                    .iter()
                    .map(|e| e.size_bytes.bytes())
                    .collect::<Vec<_>>()
            })
            .sum()
    }

    /// Remove one entry from `ns` per `policy`; returns whether one was
    /// removed.
    fn evict_one(ns: &NamespaceState<V>, policy: EvictionPolicy) -> bool {
        let victim = match policy {
            EvictionPolicy::Lru => ns
                .entries
                .iter()
                .min_by_key(|e| e.accessed_at)
                .map(|e| e.key().clone()),
            EvictionPolicy::Fifo => ns
                .entries
                .iter()
                .min_by_key(|e| e.created_at)
                .map(|e| e.key().clone()),
            EvictionPolicy::Lfu => ns
                .entries
                .iter()
                .min_by_key(|e| e.access_count)
                .map(|e| e.key().clone()),
            EvictionPolicy::Ttl => {
                let distant_future = Utc.with_ymd_and_hms(9999, 12, 31, 23, 59, 59).unwrap();
                ns.entries
                    .iter()
                    .min_by_key(|e| {
                        let ttl = ns.effective_ttl(e);
                        ttl.expiry_time(e.created_at).unwrap_or(distant_future)
                    })
                    .map(|e| e.key().clone())
            }
            EvictionPolicy::Priority => ns
                .entries
                .iter()
                .min_by_key(|e| e.priority.weight())
                .map(|e| e.key().clone()),
            EvictionPolicy::Hybrid => ns
                .entries
                .iter()
                .min_by_key(|e| (e.priority.weight(), e.accessed_at))
                .map(|e| e.key().clone()),
        };
        match victim {
            Some(k) => ns.entries.remove(&k).is_some(),
            None => false,
        }
    }

    /// Spawn a background sweep removing expired entries at `interval`.
    pub fn spawn_cleanup_loop(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()>
    where
        V: 'static,
    {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match self.cleanup_expired().await {
                    Ok(n) if n > 0 => tracing::debug!(removed = n, "memory repository swept expired entries"),
                    Err(e) => tracing::warn!(error = %e, "memory repository sweep failed"),
                    _ => {}
                }
            }
        })
    }
}

#[async_trait]
impl<V> CacheRepository<V> for MemoryRepository<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, key: &Key) -> NeoCacheResult<Option<V>> {
        let ns = self.namespace(namespace);
        let now = Utc::now();
        let expired = {
            if let Some(entry) = ns.entries.get(key.as_str()) {
                ns.effective_ttl(&entry).is_expired(entry.created_at, now)
            } else {
                let mut stats = self.stats.lock();
                stats.misses += 1;
                return Ok(None);
            }
        };
        if expired {
            ns.entries.remove(key.as_str());
            let mut stats = self.stats.lock();
            stats.misses += 1;
            stats.expirations += 1;
            return Ok(None);
        }
        let value = ns.entries.get_mut(key.as_str()).map(|mut e| {
            e.touch(now);
            e.value.clone()
        });
        let mut stats = self.stats.lock();
        if value.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        Ok(value)
    }

    async fn set(&self, entry: Entry<V>) -> NeoCacheResult<bool> {
        let ns = self.namespace(&entry.namespace.bucket_id());
        let max_entries = ns.policy.read().max_entries;
        let policy = ns.policy.read().eviction_policy;
        if !ns.entries.contains_key(entry.key.as_str()) {
            while ns.entries.len() as u64 >= max_entries {
                if !Self::evict_one(&ns, policy) {
                    break;
                }
                self.stats.lock().evictions += 1;
            }
        }
        if let Some(cap) = self.global_memory_cap_bytes {
            let projected = self.total_memory_bytes() + entry.size_bytes.bytes();
            if projected > cap && !ns.entries.contains_key(entry.key.as_str()) {
                return Err(NeoCacheError::CapacityExceeded {
                    current: projected,
                    limit: cap,
                    operation: "global_memory_cap".to_string(),
                });
            }
        }
        ns.entries.insert(entry.key.as_str().to_string(), entry);
        self.stats.lock().sets += 1;
        Ok(true)
    }

    async fn delete(&self, namespace: &str, key: &Key) -> NeoCacheResult<bool> {
        let ns = self.namespace(namespace);
        let removed = ns.entries.remove(key.as_str()).is_some();
        if removed {
            self.stats.lock().deletes += 1;
        }
        Ok(removed)
    }

    async fn exists(&self, namespace: &str, key: &Key) -> NeoCacheResult<bool> {
        let ns = self.namespace(namespace);
        let now = Utc::now();
        if let Some(entry) = ns.entries.get(key.as_str()) {
            if ns.effective_ttl(&entry).is_expired(entry.created_at, now) {
                drop(entry);
                ns.entries.remove(key.as_str());
                return Ok(false);
            }
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn get_ttl(&self, namespace: &str, key: &Key) -> NeoCacheResult<Option<Ttl>> {
        let ns = self.namespace(namespace);
        Ok(ns.entries.get(key.as_str()).and_then(|e| e.ttl))
    }

    async fn extend_ttl(&self, namespace: &str, key: &Key, additional_seconds: i64) -> NeoCacheResult<bool> {
        let ns = self.namespace(namespace);
        if let Some(mut entry) = ns.entries.get_mut(key.as_str()) {
            let current = entry.ttl.unwrap_or_else(|| Ttl::new(ns.policy.read().default_ttl).unwrap_or_else(|_| Ttl::never_expire()));
            entry.ttl = Some(current.extend(additional_seconds)?);
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn find_keys(&self, pattern: &InvalidationPattern, namespace: Option<&str>) -> NeoCacheResult<Vec<Key>> {
        let mut out = Vec::new();
        match namespace {
            Some(name) => {
                let ns = self.namespace(name);
                for e in ns.entries.iter() {
                    if pattern.matches(e.key()) {
                        if let Ok(k) = Key::new(e.key().clone()) {
                            out.push(k);
                        }
                    }
                }
            }
            None => {
                for ns_entry in self.namespaces.iter() {
                    let ns_name = ns_entry.key().clone();
                    for e in ns_entry.value().entries.iter() {
                        let composite = format!("{ns_name}:{}", e.key());
                        if pattern.matches(&composite) {
                            if let Ok(k) = Key::new(e.key().clone()) {
                                out.push(k);
                            }
                        }
                    }
                }
            }
        }
        Ok(out)
    }

    async fn flush_namespace(&self, namespace: &str) -> NeoCacheResult<usize> {
        let ns = self.namespace(namespace);
        let count = ns.entries.len();
        ns.entries.clear();
        Ok(count)
    }

    async fn get_namespace_size(&self, namespace: &str) -> NeoCacheResult<u64> {
        Ok(self.namespace(namespace).entries.len() as u64)
    }

    async fn get_namespace_memory(&self, namespace: &str) -> NeoCacheResult<u64> {
        Ok(self
            .namespace(namespace)
            .entries
            .iter()
            .map(|e| e.size_bytes.bytes())
            .sum())
    }

    async fn list_namespaces(&self) -> NeoCacheResult<Vec<String>> {
        Ok(self.namespaces.iter().map(|e| e.key().clone()).collect())
    }

    async fn get_stats(&self) -> NeoCacheResult<RepositoryStats> {
        Ok(self.stats.lock().clone())
    }

    async fn get_info(&self) -> NeoCacheResult<RepositoryInfo> {
        let namespaces: Vec<String> = self.namespaces.iter().map(|e| e.key().clone()).collect();
        let total_entries = self.namespaces.iter().map(|e| e.entries.len() as u64).sum();
        Ok(RepositoryInfo {
            backend: "memory".to_string(),
            total_entries,
            namespaces,
        })
    }

    async fn ping(&self) -> NeoCacheResult<bool> {
        Ok(true)
    }

    async fn cleanup_expired(&self) -> NeoCacheResult<usize> {
        let now = Utc::now();
        let mut removed = 0usize;
        for ns_entry in self.namespaces.iter() {
            let ns = ns_entry.value();
            let expired_keys: Vec<String> = ns
                .entries
                .iter()
                .filter(|e| ns.effective_ttl(e).is_expired(e.created_at, now))
                .map(|e| e.key().clone())
                .collect();
            for k in expired_keys {
                if ns.entries.remove(&k).is_some() {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            self.stats.lock().expirations += removed as u64;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Namespace;
    use crate::value_objects::{Priority, SizeBytes};

    fn entry(ns: &str, key: &str, ttl: Option<Ttl>) -> Entry<String> {
        Entry::new(
            Key::new(key).unwrap(),
            "value".to_string(),
            ttl,
            Priority::Medium,
            Namespace::new(ns, None).unwrap(),
            SizeBytes::new(5).unwrap(),
        )
    }

    #[tokio::test]
    async fn set_then_get_returns_value() {
        let repo = MemoryRepository::new(NamespacePolicy::default(), None);
        repo.set(entry("users", "1", None)).await.unwrap();
        let v = repo.get("users", &Key::new("1").unwrap()).await.unwrap();
        assert_eq!(v, Some("value".to_string()));
    }

    #[tokio::test]
    async fn instant_ttl_expires_on_next_get() {
        let repo = MemoryRepository::new(NamespacePolicy::default(), None);
        repo.set(entry("users", "1", Some(Ttl::instant_expire()))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let v = repo.get("users", &Key::new("1").unwrap()).await.unwrap();
        assert_eq!(v, None);
    }

    #[tokio::test]
    async fn flush_namespace_empties_it() {
        let repo = MemoryRepository::new(NamespacePolicy::default(), None);
        repo.set(entry("users", "1", None)).await.unwrap();
        repo.set(entry("users", "2", None)).await.unwrap();
        let removed = repo.flush_namespace("users").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(repo.get_namespace_size("users").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn lru_eviction_removes_least_recently_used() {
        let mut policy = NamespacePolicy::default();
        policy.max_entries = 2;
        policy.eviction_policy = EvictionPolicy::Lru;
        let repo = MemoryRepository::new(policy, None);
        repo.set(entry("users", "1", None)).await.unwrap();
        repo.set(entry("users", "2", None)).await.unwrap();
        // touch "1" so "2" becomes the least recently used
        repo.get("users", &Key::new("1").unwrap()).await.unwrap();
        repo.set(entry("users", "3", None)).await.unwrap();
        assert_eq!(repo.get("users", &Key::new("2").unwrap()).await.unwrap(), None);
        assert!(repo.get("users", &Key::new("1").unwrap()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn wildcard_find_keys_scopes_to_namespace() {
        let repo = MemoryRepository::new(NamespacePolicy::default(), None);
        repo.set(entry("users", "1:profile", None)).await.unwrap();
        repo.set(entry("users", "1:settings", None)).await.unwrap();
        repo.set(entry("users", "2:profile", None)).await.unwrap();
        let pattern = InvalidationPattern::wildcard("1:*", true).unwrap();
        let found = repo.find_keys(&pattern, Some("users")).await.unwrap();
        assert_eq!(found.len(), 2);
    }
}
