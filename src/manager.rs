//! `CacheManager` facade (spec §4.3).
//!
//! Construction only happens through [`CacheManagerBuilder`], mirroring
//! the teacher's `MultiTierCache::new(config)`/`WriteBehindCache::new`
//! constructors — never a bare struct literal. Repository/serializer
//! failures are swallowed here per the facade's error policy: `get`
//! degrades to `None`, `set` degrades to `false`, with the original
//! error logged at `warn` before being discarded.

use std::future::Future;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};

use crate::distribution::Distributor;
use crate::error::{NeoCacheError, NeoCacheResult};
use crate::events::EventPublisher;
use crate::invalidation::Invalidator;
use crate::model::{Entry, Namespace};
use crate::repository::CacheRepository;
use crate::serializer::CacheSerializer;
use crate::value_objects::{Key, Priority, SizeBytes, Ttl};

/// Facade over a repository, serializer, and the invalidation/distribution/
/// event-publishing subsystems wired in at construction time.
pub struct CacheManager<V> {
    repository: Arc<dyn CacheRepository<V>>,
    serializer: Box<dyn CacheSerializer<V>>,
    events: Option<Arc<EventPublisher>>,
    invalidator: Option<Arc<Invalidator<V>>>,
    distributor: Option<Arc<Distributor>>,
    default_namespace: Namespace,
    default_ttl_seconds: i64,
    compression_threshold: usize,
}

impl<V> CacheManager<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn estimate_size(&self, value: &V) -> SizeBytes {
        match self.serializer.serialize(value, self.compression_threshold) {
            Ok(bytes) => {
                let len = bytes.len() as u64;
                SizeBytes::new(len).unwrap_or_else(|_| {
                    tracing::warn!(bytes = len, "estimated entry size exceeds maximum, clamping");
                    SizeBytes::new(crate::value_objects::size::MAX_SIZE_BYTES).expect("max size is valid")
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to estimate entry size, defaulting to zero");
                SizeBytes::new(0).expect("zero is always valid")
            }
        }
    }

    /// Fetch a value, degrading any repository failure to a miss.
    pub async fn get(&self, namespace: &str, key: &Key) -> Option<V> {
        match self.repository.get(namespace, key).await {
            Ok(Some(v)) => {
                tracing::debug!(namespace, key = %key, "cache hit");
                if let Some(events) = &self.events {
                    events.record_hit().await;
                }
                Some(v)
            }
            Ok(None) => {
                tracing::debug!(namespace, key = %key, "cache miss");
                if let Some(events) = &self.events {
                    events.record_miss("not_found").await;
                }
                None
            }
            Err(e) => {
                tracing::warn!(namespace, key = %key, error = %e, "cache read failed, degrading to miss");
                if let Some(events) = &self.events {
                    events.record_miss("error").await;
                }
                None
            }
        }
    }

    /// Store a value, degrading any repository failure to `false`.
    pub async fn set(&self, namespace: &str, key: Key, value: V, ttl: Option<Ttl>, priority: Priority) -> bool {
        let ns = Namespace::new(namespace, self.default_namespace.tenant_id().map(str::to_string)).unwrap_or_else(|_| self.default_namespace.clone());
        let size_bytes = self.estimate_size(&value);
        let ttl = ttl.or_else(|| Ttl::new(self.default_ttl_seconds).ok());
        let entry = Entry::new(key, value, ttl, priority, ns, size_bytes);
        match self.repository.set(entry).await {
            Ok(ok) => ok,
            Err(e) => {
                tracing::warn!(namespace, error = %e, "cache write failed, degrading to false");
                false
            }
        }
    }

    /// Remove a value, degrading any repository failure to `false`.
    pub async fn delete(&self, namespace: &str, key: &Key) -> bool {
        let removed = self.repository.delete(namespace, key).await.unwrap_or_else(|e| {
            tracing::warn!(namespace, key = %key, error = %e, "cache delete failed");
            false
        });
        if removed {
            if let Some(events) = &self.events {
                events.record_invalidated("manual_delete").await;
            }
        }
        removed
    }

    /// Whether a live entry exists, degrading any repository failure to
    /// `false`.
    pub async fn exists(&self, namespace: &str, key: &Key) -> bool {
        self.repository.exists(namespace, key).await.unwrap_or_else(|e| {
            tracing::warn!(namespace, key = %key, error = %e, "cache exists check failed");
            false
        })
    }

    /// Fetch-or-compute: on miss, run `factory` and cache its result; on
    /// factory error, nothing is cached and `None` is returned.
    pub async fn get_or_set<F, Fut>(
        &self,
        namespace: &str,
        key: &Key,
        ttl: Option<Ttl>,
        priority: Priority,
        factory: F,
    ) -> Option<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = NeoCacheResult<V>>,
    {
        if let Some(v) = self.get(namespace, key).await {
            return Some(v);
        }
        match factory().await {
            Ok(value) => {
                self.set(namespace, key.clone(), value.clone(), ttl, priority).await;
                Some(value)
            }
            Err(e) => {
                tracing::warn!(namespace, key = %key, error = %e, "get_or_set factory failed, nothing cached");
                None
            }
        }
    }

    /// Batch fetch; missing/failed keys are simply absent-valued.
    pub async fn get_many(&self, namespace: &str, keys: &[Key]) -> Vec<(Key, Option<V>)> {
        self.repository.get_many(namespace, keys).await.unwrap_or_else(|e| {
            tracing::warn!(namespace, error = %e, "batch get failed, returning all misses");
            keys.iter().map(|k| (k.clone(), None)).collect()
        })
    }

    /// Batch set; returns the count actually stored.
    pub async fn set_many(&self, entries: Vec<Entry<V>>) -> usize {
        self.repository.set_many(entries).await.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "batch set failed");
            0
        })
    }

    /// Fetch a user-scoped value (`user:{user_id}:{key}`) in the default
    /// namespace.
    pub async fn get_user(&self, user_id: &str, key: &str) -> Option<V> {
        let k = Key::user_key(user_id, key).ok()?;
        self.get(self.default_namespace.name(), &k).await
    }

    /// Store a user-scoped value in the default namespace.
    pub async fn set_user(&self, user_id: &str, key: &str, value: V, ttl: Option<Ttl>) -> bool {
        match Key::user_key(user_id, key) {
            Ok(k) => self.set(self.default_namespace.name(), k, value, ttl, Priority::default()).await,
            Err(e) => {
                tracing::warn!(error = %e, "invalid user-scoped key");
                false
            }
        }
    }

    /// Fetch a tenant-scoped value (`tenant:{tenant_id}:{key}`) in the
    /// default namespace.
    pub async fn get_tenant(&self, tenant_id: &str, key: &str) -> Option<V> {
        let k = Key::tenant_key(tenant_id, key).ok()?;
        self.get(self.default_namespace.name(), &k).await
    }

    /// Store a tenant-scoped value in the default namespace.
    pub async fn set_tenant(&self, tenant_id: &str, key: &str, value: V, ttl: Option<Ttl>) -> bool {
        match Key::tenant_key(tenant_id, key) {
            Ok(k) => self.set(self.default_namespace.name(), k, value, ttl, Priority::default()).await,
            Err(e) => {
                tracing::warn!(error = %e, "invalid tenant-scoped key");
                false
            }
        }
    }

    /// The invalidation subsystem wired in at construction, if any.
    pub fn invalidator(&self) -> Option<&Arc<Invalidator<V>>> {
        self.invalidator.as_ref()
    }

    /// The distribution subsystem wired in at construction, if any.
    pub fn distributor(&self) -> Option<&Arc<Distributor>> {
        self.distributor.as_ref()
    }

    /// The underlying repository, for callers needing lower-level access
    /// (health checks, maintenance tasks).
    pub fn repository(&self) -> &Arc<dyn CacheRepository<V>> {
        &self.repository
    }
}

/// Configuration-aware factory for [`CacheManager`], the only supported
/// construction path.
pub struct CacheManagerBuilder<V> {
    repository: Option<Arc<dyn CacheRepository<V>>>,
    serializer: Option<Box<dyn CacheSerializer<V>>>,
    events: Option<Arc<EventPublisher>>,
    invalidator: Option<Arc<Invalidator<V>>>,
    distributor: Option<Arc<Distributor>>,
    default_namespace: Option<Namespace>,
    default_ttl_seconds: i64,
    compression_threshold: usize,
}

impl<V> Default for CacheManagerBuilder<V> {
    fn default() -> Self {
        Self {
            repository: None,
            serializer: None,
            events: None,
            invalidator: None,
            distributor: None,
            default_namespace: None,
            default_ttl_seconds: 3600,
            compression_threshold: 1024,
        }
    }
}

impl<V> CacheManagerBuilder<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Start a fresh builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the backing repository (required).
    pub fn with_repository(mut self, repository: Arc<dyn CacheRepository<V>>) -> Self {
        self.repository = Some(repository);
        self
    }

    /// Set the value serializer, used for size estimation (required).
    pub fn with_serializer(mut self, serializer: Box<dyn CacheSerializer<V>>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    /// Wire in the event publisher.
    pub fn with_events(mut self, events: Arc<EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Wire in the invalidation subsystem.
    pub fn with_invalidator(mut self, invalidator: Arc<Invalidator<V>>) -> Self {
        self.invalidator = Some(invalidator);
        self
    }

    /// Wire in the distribution subsystem.
    pub fn with_distributor(mut self, distributor: Arc<Distributor>) -> Self {
        self.distributor = Some(distributor);
        self
    }

    /// Override the default namespace (defaults to `"default"`).
    pub fn with_default_namespace(mut self, namespace: Namespace) -> Self {
        self.default_namespace = Some(namespace);
        self
    }

    /// Override the default TTL in seconds applied to entries set without
    /// an explicit TTL.
    pub fn with_default_ttl(mut self, seconds: i64) -> Self {
        self.default_ttl_seconds = seconds;
        self
    }

    /// Override the compression threshold passed through to the
    /// serializer.
    pub fn with_compression_threshold(mut self, threshold: usize) -> Self {
        self.compression_threshold = threshold;
        self
    }

    /// Build the manager; fails if repository or serializer were never
    /// supplied.
    pub fn build(self) -> NeoCacheResult<CacheManager<V>> {
        let repository = self
            .repository
            .ok_or_else(|| NeoCacheError::Backend("CacheManagerBuilder: repository not set".to_string()))?;
        let serializer = self
            .serializer
            .ok_or_else(|| NeoCacheError::Backend("CacheManagerBuilder: serializer not set".to_string()))?;
        let default_namespace = match self.default_namespace {
            Some(ns) => ns,
            None => Namespace::new("default", None)?,
        };
        Ok(CacheManager {
            repository,
            serializer,
            events: self.events,
            invalidator: self.invalidator,
            distributor: self.distributor,
            default_namespace,
            default_ttl_seconds: self.default_ttl_seconds,
            compression_threshold: self.compression_threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryRepository;
    use crate::serializer::formats::JsonFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn manager() -> CacheManager<String> {
        let repository: Arc<dyn CacheRepository<String>> =
            Arc::new(MemoryRepository::new(Default::default(), None));
        CacheManagerBuilder::new()
            .with_repository(repository)
            .with_serializer(Box::new(JsonFormat))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let m = manager();
        let key = Key::new("1").unwrap();
        assert!(m.set("users", key.clone(), "hi".to_string(), None, Priority::Medium).await);
        assert_eq!(m.get("users", &key).await, Some("hi".to_string()));
    }

    #[tokio::test]
    async fn get_or_set_invokes_factory_once_on_miss() {
        let m = manager();
        let key = Key::new("1").unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let value = m
            .get_or_set("users", &key, None, Priority::Medium, || async move {
                calls2.fetch_add(1, Ordering::SeqCst);
                Ok("computed".to_string())
            })
            .await;
        assert_eq!(value, Some("computed".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(m.get("users", &key).await, Some("computed".to_string()));
    }

    #[tokio::test]
    async fn get_or_set_does_not_cache_on_factory_error() {
        let m = manager();
        let key = Key::new("1").unwrap();
        let value = m
            .get_or_set("users", &key, None, Priority::Medium, || async {
                Err(NeoCacheError::Backend("boom".to_string()))
            })
            .await;
        assert_eq!(value, None);
        assert_eq!(m.get("users", &key).await, None);
    }

    #[tokio::test]
    async fn user_scoped_convenience_methods_round_trip() {
        let m = manager();
        assert!(m.set_user("42", "profile", "alice".to_string(), None).await);
        assert_eq!(m.get_user("42", "profile").await, Some("alice".to_string()));
    }
}
