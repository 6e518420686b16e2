//! Backend-agnostic storage contract plus concrete backends.

pub mod external_kv;
pub mod memory;

use async_trait::async_trait;

use crate::error::NeoCacheResult;
use crate::model::Entry;
use crate::value_objects::{InvalidationPattern, Key, Ttl};

pub use external_kv::{ExternalKvRepository, KvBackend};
pub use memory::MemoryRepository;

/// Aggregate repository statistics.
#[derive(Debug, Clone, Default)]
pub struct RepositoryStats {
    /// Total successful reads that found a live entry.
    pub hits: u64,
    /// Total reads that found nothing (including lazily-expired entries).
    pub misses: u64,
    /// Total successful writes.
    pub sets: u64,
    /// Total successful deletes.
    pub deletes: u64,
    /// Total entries evicted to satisfy a capacity limit.
    pub evictions: u64,
    /// Total entries removed by expiry (lazy or swept).
    pub expirations: u64,
}

/// Point-in-time repository information, analogous to a `ping`/`info`
/// response.
#[derive(Debug, Clone)]
pub struct RepositoryInfo {
    /// Backend kind (`"memory"`, `"external-kv"`).
    pub backend: String,
    /// Total live entries across all namespaces.
    pub total_entries: u64,
    /// Known namespace names.
    pub namespaces: Vec<String>,
}

/// Backend-agnostic storage contract (spec §4.2).
///
/// `get` is the single place lazy expiry happens: an expired hit is
/// removed and reported as `Ok(None)`, never leaked to the caller as a
/// stale value.
#[async_trait]
pub trait CacheRepository<V>: Send + Sync
where
    V: Clone + Send + Sync,
{
    /// Fetch a single entry's value, honoring lazy expiry.
    async fn get(&self, namespace: &str, key: &Key) -> NeoCacheResult<Option<V>>;

    /// Store a value with the given TTL/priority/size; a `None` TTL
    /// defers to the namespace default.
    async fn set(&self, entry: Entry<V>) -> NeoCacheResult<bool>;

    /// Remove an entry; returns whether it existed.
    async fn delete(&self, namespace: &str, key: &Key) -> NeoCacheResult<bool>;

    /// Whether a live (non-expired) entry exists.
    async fn exists(&self, namespace: &str, key: &Key) -> NeoCacheResult<bool>;

    /// Remaining TTL, if the entry exists and is finite.
    async fn get_ttl(&self, namespace: &str, key: &Key) -> NeoCacheResult<Option<Ttl>>;

    /// Extend an entry's TTL by `additional_seconds`.
    async fn extend_ttl(&self, namespace: &str, key: &Key, additional_seconds: i64) -> NeoCacheResult<bool>;

    /// Batch get; missing/expired keys are simply absent from the result.
    async fn get_many(&self, namespace: &str, keys: &[Key]) -> NeoCacheResult<Vec<(Key, Option<V>)>> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            out.push((key.clone(), self.get(namespace, key).await?));
        }
        Ok(out)
    }

    /// Batch set.
    async fn set_many(&self, entries: Vec<Entry<V>>) -> NeoCacheResult<usize> {
        let mut count = 0;
        for entry in entries {
            if self.set(entry).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Batch delete.
    async fn delete_many(&self, namespace: &str, keys: &[Key]) -> NeoCacheResult<usize> {
        let mut count = 0;
        for key in keys {
            if self.delete(namespace, key).await? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// List keys (within `namespace`, if given) matching `pattern`.
    async fn find_keys(&self, pattern: &InvalidationPattern, namespace: Option<&str>) -> NeoCacheResult<Vec<Key>>;

    /// Delete keys matching `pattern`; returns the count removed.
    async fn invalidate_pattern(&self, pattern: &InvalidationPattern, namespace: Option<&str>) -> NeoCacheResult<usize> {
        let keys = self.find_keys(pattern, namespace).await?;
        let mut count = 0;
        for key in &keys {
            if let Some(ns) = namespace {
                if self.delete(ns, key).await? {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    /// Remove every entry in `namespace`; returns the count removed.
    async fn flush_namespace(&self, namespace: &str) -> NeoCacheResult<usize>;

    /// Live entry count in `namespace`.
    async fn get_namespace_size(&self, namespace: &str) -> NeoCacheResult<u64>;

    /// Estimated memory footprint of `namespace`, in bytes.
    async fn get_namespace_memory(&self, namespace: &str) -> NeoCacheResult<u64>;

    /// All known namespace names.
    async fn list_namespaces(&self) -> NeoCacheResult<Vec<String>>;

    /// Aggregate statistics.
    async fn get_stats(&self) -> NeoCacheResult<RepositoryStats>;

    /// Point-in-time backend info.
    async fn get_info(&self) -> NeoCacheResult<RepositoryInfo>;

    /// Lightweight liveness probe.
    async fn ping(&self) -> NeoCacheResult<bool>;

    /// Sweep and remove expired entries; returns the count removed.
    async fn cleanup_expired(&self) -> NeoCacheResult<usize>;

    /// Backend-specific maintenance hook (compaction, defragmentation).
    async fn optimize(&self) -> NeoCacheResult<()> {
        Ok(())
    }

    /// Begin a transaction; no-op unless the backend supports them.
    async fn begin(&self) -> NeoCacheResult<()> {
        Ok(())
    }

    /// Commit a transaction; no-op unless the backend supports them.
    async fn commit(&self) -> NeoCacheResult<()> {
        Ok(())
    }

    /// Roll back a transaction; no-op unless the backend supports them.
    async fn rollback(&self) -> NeoCacheResult<()> {
        Ok(())
    }
}
