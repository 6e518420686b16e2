//! External key-value repository backend (Redis et al.).
//!
//! Grounded in the teacher's distributed-tier plumbing in
//! `cache::tier`/`cache::lock`, generalized behind a small [`KvBackend`]
//! trait so the persisted-state key schema (spec §6: a value key plus a
//! `:meta` sidecar sharing its TTL) is implemented once, independent of
//! which concrete store backs it.

use std::marker::PhantomData;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::{CacheRepository, RepositoryInfo, RepositoryStats};
use crate::error::{NeoCacheError, NeoCacheResult};
use crate::model::Entry;
use crate::serializer::CacheSerializer;
use crate::value_objects::{InvalidationPattern, Key, Ttl};

/// Minimal contract an external key-value store must provide.
///
/// Implementations are responsible only for byte storage and TTL
/// management; key composition and metadata live in
/// [`ExternalKvRepository`].
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Fetch raw bytes for `key`, if present.
    async fn get_bytes(&self, key: &str) -> NeoCacheResult<Option<Vec<u8>>>;

    /// Store raw bytes for `key`. `ttl_seconds` of `None` means no
    /// expiry; `Some(0)` means expire immediately.
    async fn set_bytes_with_ttl(&self, key: &str, value: Vec<u8>, ttl_seconds: Option<i64>) -> NeoCacheResult<()>;

    /// Remove `key`; returns whether it existed.
    async fn delete(&self, key: &str) -> NeoCacheResult<bool>;

    /// List keys matching a backend-native glob `prefix*`-style scan.
    async fn scan_keys(&self, prefix: &str) -> NeoCacheResult<Vec<String>>;

    /// Liveness probe.
    async fn ping(&self) -> NeoCacheResult<bool>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ValueMetadata {
    ttl_seconds: Option<i64>,
    priority: u8,
    created_at: DateTime<Utc>,
    size_bytes: u64,
}

/// External-store-backed `CacheRepository`. Generic over the wire
/// [`CacheSerializer`] and the concrete [`KvBackend`].
pub struct ExternalKvRepository<V, S, B> {
    backend: B,
    serializer: S,
    key_prefix: String,
    compression_threshold: usize,
    stats: Mutex<RepositoryStats>,
    _marker: PhantomData<V>,
}

impl<V, S, B> ExternalKvRepository<V, S, B>
where
    V: Send + Sync + 'static,
    S: CacheSerializer<V>,
    B: KvBackend,
{
    /// Construct a repository over `backend`, namespacing every physical
    /// key under `key_prefix`.
    pub fn new(backend: B, serializer: S, key_prefix: impl Into<String>, compression_threshold: usize) -> Self {
        Self {
            backend,
            serializer,
            key_prefix: key_prefix.into(),
            compression_threshold,
            stats: Mutex::new(RepositoryStats::default()),
            _marker: PhantomData,
        }
    }

    fn value_key(&self, namespace: &str, key: &str) -> String {
        format!("{}{namespace}:{key}", self.key_prefix)
    }

    fn meta_key(value_key: &str) -> String {
        format!("{value_key}:meta")
    }
}

#[async_trait]
impl<V, S, B> CacheRepository<V> for ExternalKvRepository<V, S, B>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
    S: CacheSerializer<V>,
    B: KvBackend,
{
    async fn get(&self, namespace: &str, key: &Key) -> NeoCacheResult<Option<V>> {
        let vkey = self.value_key(namespace, key.as_str());
        match self.backend.get_bytes(&vkey).await? {
            Some(bytes) => {
                let value = self.serializer.deserialize(&bytes)?;
                self.stats.lock().hits += 1;
                Ok(Some(value))
            }
            None => {
                self.stats.lock().misses += 1;
                Ok(None)
            }
        }
    }

    async fn set(&self, entry: Entry<V>) -> NeoCacheResult<bool> {
        let vkey = self.value_key(&entry.namespace.bucket_id(), entry.key.as_str());
        let mkey = Self::meta_key(&vkey);
        let ttl_seconds = entry.ttl.map(|t| t.seconds()).filter(|s| *s >= 0);
        let bytes = self.serializer.serialize(&entry.value, self.compression_threshold)?;
        self.backend.set_bytes_with_ttl(&vkey, bytes, ttl_seconds).await?;
        let meta = ValueMetadata {
            ttl_seconds: entry.ttl.map(|t| t.seconds()),
            priority: entry.priority as u8,
            created_at: entry.created_at,
            size_bytes: entry.size_bytes.bytes(),
        };
        let meta_bytes = serde_json::to_vec(&meta).map_err(|e| NeoCacheError::SerializationError {
            format: "json".to_string(),
            cause: e.to_string(),
            recoverable: false,
        })?;
        self.backend.set_bytes_with_ttl(&mkey, meta_bytes, ttl_seconds).await?;
        self.stats.lock().sets += 1;
        Ok(true)
    }

    async fn delete(&self, namespace: &str, key: &Key) -> NeoCacheResult<bool> {
        let vkey = self.value_key(namespace, key.as_str());
        let mkey = Self::meta_key(&vkey);
        let removed = self.backend.delete(&vkey).await?;
        let _ = self.backend.delete(&mkey).await?;
        if removed {
            self.stats.lock().deletes += 1;
        }
        Ok(removed)
    }

    async fn exists(&self, namespace: &str, key: &Key) -> NeoCacheResult<bool> {
        let vkey = self.value_key(namespace, key.as_str());
        Ok(self.backend.get_bytes(&vkey).await?.is_some())
    }

    async fn get_ttl(&self, namespace: &str, key: &Key) -> NeoCacheResult<Option<Ttl>> {
        let vkey = self.value_key(namespace, key.as_str());
        let mkey = Self::meta_key(&vkey);
        match self.backend.get_bytes(&mkey).await? {
            Some(bytes) => {
                let meta: ValueMetadata = serde_json::from_slice(&bytes).map_err(|e| NeoCacheError::DeserializationError {
                    format: "json".to_string(),
                    cause: e.to_string(),
                    recoverable: false,
                })?;
                Ok(meta.ttl_seconds.map(Ttl::new).transpose()?)
            }
            None => Ok(None),
        }
    }

    async fn extend_ttl(&self, namespace: &str, key: &Key, additional_seconds: i64) -> NeoCacheResult<bool> {
        let vkey = self.value_key(namespace, key.as_str());
        let mkey = Self::meta_key(&vkey);
        let (Some(value_bytes), Some(meta_bytes)) = (
            self.backend.get_bytes(&vkey).await?,
            self.backend.get_bytes(&mkey).await?,
        ) else {
            return Ok(false);
        };
        let mut meta: ValueMetadata = serde_json::from_slice(&meta_bytes).map_err(|e| NeoCacheError::DeserializationError {
            format: "json".to_string(),
            cause: e.to_string(),
            recoverable: false,
        })?;
        let current = meta.ttl_seconds.map(Ttl::new).transpose()?.unwrap_or_else(Ttl::never_expire);
        let extended = current.extend(additional_seconds)?;
        meta.ttl_seconds = Some(extended.seconds());
        let new_ttl = Some(extended.seconds()).filter(|s| *s >= 0);
        self.backend.set_bytes_with_ttl(&vkey, value_bytes, new_ttl).await?;
        let meta_bytes = serde_json::to_vec(&meta).map_err(|e| NeoCacheError::SerializationError {
            format: "json".to_string(),
            cause: e.to_string(),
            recoverable: false,
        })?;
        self.backend.set_bytes_with_ttl(&mkey, meta_bytes, new_ttl).await?;
        Ok(true)
    }

    async fn find_keys(&self, pattern: &InvalidationPattern, namespace: Option<&str>) -> NeoCacheResult<Vec<Key>> {
        let scan_prefix = match namespace {
            Some(ns) => format!("{}{ns}:", self.key_prefix),
            None => self.key_prefix.clone(),
        };
        let mut out = Vec::new();
        for physical in self.backend.scan_keys(&scan_prefix).await? {
            if physical.ends_with(":meta") {
                continue;
            }
            let logical = physical.strip_prefix(&scan_prefix).unwrap_or(&physical);
            if pattern.matches(logical) {
                if let Ok(k) = Key::new(logical) {
                    out.push(k);
                }
            }
        }
        Ok(out)
    }

    async fn flush_namespace(&self, namespace: &str) -> NeoCacheResult<usize> {
        let scan_prefix = format!("{}{namespace}:", self.key_prefix);
        let keys = self.backend.scan_keys(&scan_prefix).await?;
        let mut removed = 0;
        for physical in keys {
            if self.backend.delete(&physical).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn get_namespace_size(&self, namespace: &str) -> NeoCacheResult<u64> {
        let scan_prefix = format!("{}{namespace}:", self.key_prefix);
        let keys = self.backend.scan_keys(&scan_prefix).await?;
        Ok(keys.iter().filter(|k| !k.ends_with(":meta")).count() as u64)
    }

    async fn get_namespace_memory(&self, namespace: &str) -> NeoCacheResult<u64> {
        let scan_prefix = format!("{}{namespace}:", self.key_prefix);
        let mut total = 0u64;
        for physical in self.backend.scan_keys(&scan_prefix).await? {
            if physical.ends_with(":meta") {
                continue;
            }
            if let Some(bytes) = self.backend.get_bytes(&Self::meta_key(&physical)).await? {
                if let Ok(meta) = serde_json::from_slice::<ValueMetadata>(&bytes) {
                    total += meta.size_bytes;
                }
            }
        }
        Ok(total)
    }

    async fn list_namespaces(&self) -> NeoCacheResult<Vec<String>> {
        let mut namespaces = std::collections::HashSet::new();
        for physical in self.backend.scan_keys(&self.key_prefix).await? {
            let rest = physical.strip_prefix(&self.key_prefix).unwrap_or(&physical);
            if let Some((ns, _)) = rest.split_once(':') {
                namespaces.insert(ns.to_string());
            }
        }
        Ok(namespaces.into_iter().collect())
    }

    async fn get_stats(&self) -> NeoCacheResult<RepositoryStats> {
        Ok(self.stats.lock().clone())
    }

    async fn get_info(&self) -> NeoCacheResult<RepositoryInfo> {
        let namespaces = self.list_namespaces().await?;
        let mut total_entries = 0u64;
        for ns in &namespaces {
            total_entries += self.get_namespace_size(ns).await?;
        }
        Ok(RepositoryInfo {
            backend: "external-kv".to_string(),
            total_entries,
            namespaces,
        })
    }

    async fn ping(&self) -> NeoCacheResult<bool> {
        self.backend.ping().await
    }

    async fn cleanup_expired(&self) -> NeoCacheResult<usize> {
        // Expiry is delegated to the backend's own TTL mechanism; nothing
        // to sweep from this side.
        Ok(0)
    }
}

#[cfg(feature = "redis-backend")]
pub mod redis_backend {
    //! `redis`-backed [`KvBackend`] implementation.

    use async_trait::async_trait;
    use redis::{aio::ConnectionManager, AsyncCommands};

    use super::KvBackend;
    use crate::error::{NeoCacheError, NeoCacheResult};

    /// A [`KvBackend`] over a shared Redis connection manager.
    pub struct RedisKvBackend {
        conn: ConnectionManager,
    }

    impl RedisKvBackend {
        /// Wrap an already-established connection manager.
        pub fn new(conn: ConnectionManager) -> Self {
            Self { conn }
        }

        /// Connect to `redis_url` and build a backend.
        pub async fn connect(redis_url: &str) -> NeoCacheResult<Self> {
            let client = redis::Client::open(redis_url).map_err(|e| NeoCacheError::Backend(e.to_string()))?;
            let conn = client
                .get_connection_manager()
                .await
                .map_err(|e| NeoCacheError::Backend(e.to_string()))?;
            Ok(Self { conn })
        }
    }

    #[async_trait]
    impl KvBackend for RedisKvBackend {
        async fn get_bytes(&self, key: &str) -> NeoCacheResult<Option<Vec<u8>>> {
            let mut conn = self.conn.clone();
            conn.get(key).await.map_err(|e| NeoCacheError::Backend(e.to_string()))
        }

        async fn set_bytes_with_ttl(&self, key: &str, value: Vec<u8>, ttl_seconds: Option<i64>) -> NeoCacheResult<()> {
            let mut conn = self.conn.clone();
            match ttl_seconds {
                Some(seconds) if seconds > 0 => conn
                    .set_ex::<_, _, ()>(key, value, seconds as u64)
                    .await
                    .map_err(|e| NeoCacheError::Backend(e.to_string())),
                Some(_) => conn
                    .set::<_, _, ()>(key, value)
                    .await
                    .map_err(|e| NeoCacheError::Backend(e.to_string())),
                None => conn
                    .set::<_, _, ()>(key, value)
                    .await
                    .map_err(|e| NeoCacheError::Backend(e.to_string())),
            }
        }

        async fn delete(&self, key: &str) -> NeoCacheResult<bool> {
            let mut conn = self.conn.clone();
            let removed: i64 = conn.del(key).await.map_err(|e| NeoCacheError::Backend(e.to_string()))?;
            Ok(removed > 0)
        }

        async fn scan_keys(&self, prefix: &str) -> NeoCacheResult<Vec<String>> {
            let mut conn = self.conn.clone();
            let pattern = format!("{prefix}*");
            conn.keys(pattern).await.map_err(|e| NeoCacheError::Backend(e.to_string()))
        }

        async fn ping(&self) -> NeoCacheResult<bool> {
            let mut conn = self.conn.clone();
            let pong: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(|e| NeoCacheError::Backend(e.to_string()))?;
            Ok(pong == "PONG")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Namespace;
    use crate::serializer::formats::JsonFormat;
    use crate::value_objects::{Priority, SizeBytes};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct InMemoryBackend {
        store: StdMutex<std::collections::HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl KvBackend for InMemoryBackend {
        async fn get_bytes(&self, key: &str) -> NeoCacheResult<Option<Vec<u8>>> {
            Ok(self.store.lock().unwrap().get(key).cloned())
        }

        async fn set_bytes_with_ttl(&self, key: &str, value: Vec<u8>, _ttl_seconds: Option<i64>) -> NeoCacheResult<()> {
            self.store.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }

        async fn delete(&self, key: &str) -> NeoCacheResult<bool> {
            Ok(self.store.lock().unwrap().remove(key).is_some())
        }

        async fn scan_keys(&self, prefix: &str) -> NeoCacheResult<Vec<String>> {
            Ok(self
                .store
                .lock()
                .unwrap()
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect())
        }

        async fn ping(&self) -> NeoCacheResult<bool> {
            Ok(true)
        }
    }

    fn repo() -> ExternalKvRepository<String, JsonFormat, InMemoryBackend> {
        ExternalKvRepository::new(InMemoryBackend::default(), JsonFormat, "neocache:", 1024)
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let r = repo();
        let ns = Namespace::new("users", None).unwrap();
        let key = Key::new("1").unwrap();
        let entry = Entry::new(key.clone(), "hello".to_string(), None, Priority::Medium, ns, SizeBytes::new(5).unwrap());
        r.set(entry).await.unwrap();
        assert_eq!(r.get("users", &key).await.unwrap(), Some("hello".to_string()));
    }

    #[tokio::test]
    async fn delete_removes_value_and_metadata() {
        let r = repo();
        let ns = Namespace::new("users", None).unwrap();
        let key = Key::new("1").unwrap();
        let entry = Entry::new(key.clone(), "hello".to_string(), None, Priority::Medium, ns, SizeBytes::new(5).unwrap());
        r.set(entry).await.unwrap();
        assert!(r.delete("users", &key).await.unwrap());
        assert_eq!(r.get("users", &key).await.unwrap(), None);
        assert_eq!(r.get_ttl("users", &key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn find_keys_excludes_metadata_sidecars() {
        let r = repo();
        let ns = Namespace::new("users", None).unwrap();
        let key = Key::new("1:profile").unwrap();
        let entry = Entry::new(key, "hello".to_string(), None, Priority::Medium, ns, SizeBytes::new(5).unwrap());
        r.set(entry).await.unwrap();
        let pattern = InvalidationPattern::prefix("1:", true).unwrap();
        let found = r.find_keys(&pattern, Some("users")).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].as_str(), "1:profile");
    }
}
