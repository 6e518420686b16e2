//! Passive configuration structures.
//!
//! Loading from environment variables or files is an embedder concern
//! (out of scope per the specification); these structs only describe the
//! recognized options and validate them once constructed.

use serde::{Deserialize, Serialize};

use crate::error::{NeoCacheError, NeoCacheResult};
use crate::model::namespace::EvictionPolicy;

/// Top-level cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default TTL in seconds applied when an entry is set without one.
    pub default_ttl: i64,
    /// Default maximum entries per namespace.
    pub max_entries: u64,
    /// Namespace used when the caller does not specify one.
    pub default_namespace: String,
    /// Default eviction policy for namespaces that don't override it.
    pub eviction_policy: EvictionPolicy,
    /// Backend selector (`memory` or `external`).
    pub backend: String,
    /// Serializer selector (`json`, `bincode`, `messagepack`).
    pub serializer: String,
    /// Whether the compression envelope may be applied.
    pub enable_compression: bool,
    /// Minimum raw size in bytes before compression is attempted.
    pub compression_threshold: usize,
    /// Interval in seconds between health probe sweeps.
    pub health_check_interval: u64,
    /// Maximum buffered domain events before a forced flush.
    pub event_batch_size: usize,
    /// Maximum milliseconds an event may sit buffered before flush.
    pub event_flush_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: 3600,
            max_entries: 10_000,
            default_namespace: "default".to_string(),
            eviction_policy: EvictionPolicy::Lru,
            backend: "memory".to_string(),
            serializer: "bincode".to_string(),
            enable_compression: true,
            compression_threshold: 1024,
            health_check_interval: 30,
            event_batch_size: 100,
            event_flush_interval_ms: 1000,
        }
    }
}

impl CacheConfig {
    /// Validate bounds and enum membership.
    pub fn validate(&self) -> NeoCacheResult<()> {
        if self.default_ttl < -1 {
            return Err(NeoCacheError::CapacityExceeded {
                current: self.default_ttl as u64,
                limit: 0,
                operation: "default_ttl".to_string(),
            });
        }
        if self.max_entries == 0 {
            return Err(NeoCacheError::CapacityExceeded {
                current: 0,
                limit: 1,
                operation: "max_entries".to_string(),
            });
        }
        if !matches!(self.backend.as_str(), "memory" | "external") {
            return Err(NeoCacheError::Backend(format!(
                "unknown backend: {}",
                self.backend
            )));
        }
        if !matches!(self.serializer.as_str(), "json" | "bincode" | "messagepack") {
            return Err(NeoCacheError::SerializationError {
                format: self.serializer.clone(),
                cause: "unknown serializer".to_string(),
                recoverable: false,
            });
        }
        Ok(())
    }
}

/// Repository connection configuration (applies to external-KV backends).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    /// Timeout for establishing a new connection, in milliseconds.
    pub connection_timeout_ms: u64,
    /// Minimum pooled connections.
    pub min_connections: u32,
    /// Maximum pooled connections.
    pub max_connections: u32,
    /// Idle connection lifetime before recycling, in seconds.
    pub connection_idle_timeout: u64,
    /// Whether the backend driver should pipeline requests.
    pub enable_pipelining: bool,
    /// Backend endpoint(s), e.g. a Redis connection URL.
    pub endpoint: Option<String>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            connection_timeout_ms: 5000,
            min_connections: 1,
            max_connections: 10,
            connection_idle_timeout: 300,
            enable_pipelining: true,
            endpoint: None,
        }
    }
}

/// Invalidation subsystem configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidationConfig {
    /// Strategy name used when callers don't specify one explicitly.
    pub default_strategy: String,
    /// Timeout in seconds for pattern-scan operations.
    pub pattern_timeout_seconds: u64,
    /// Maximum keys processed per invalidation batch.
    pub batch_size: usize,
    /// Scheduler tick interval in seconds.
    pub scheduler_check_interval: u64,
    /// Maximum number of concurrently scheduled invalidations.
    pub max_scheduled_operations: usize,
    /// Bounded event-trigger queue size.
    pub event_queue_size: usize,
    /// Maximum dependency-cascade DFS depth.
    pub max_dependency_depth: usize,
    /// Optional token-bucket rate limit, keys per second.
    pub rate_limit_per_second: Option<u64>,
    /// Optional cap on keys touched by a single invalidation call.
    pub max_keys_per_invalidation: Option<usize>,
    /// When true, invalidations are counted but not applied.
    pub enable_dry_run_mode: bool,
}

impl Default for InvalidationConfig {
    fn default() -> Self {
        Self {
            default_strategy: "pattern".to_string(),
            pattern_timeout_seconds: 5,
            batch_size: 500,
            scheduler_check_interval: 1,
            max_scheduled_operations: 10_000,
            event_queue_size: 1000,
            max_dependency_depth: 32,
            rate_limit_per_second: None,
            max_keys_per_invalidation: None,
            enable_dry_run_mode: false,
        }
    }
}

/// Cross-node distribution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Transport selector (`in-memory`, `redis-pubsub`, ...).
    pub distribution_type: String,
    /// Logical cluster name used as the channel/topic prefix.
    pub cluster_name: String,
    /// This node's identifier.
    pub node_id: String,
    /// Consistency level requested from the transport.
    pub consistency_level: String,
    /// Desired replication factor.
    pub replication_factor: u32,
    /// Heartbeat emission interval in seconds.
    pub heartbeat_interval: u64,
    /// Seconds of silence before a node is considered gone.
    pub node_timeout: u64,
    /// Missed heartbeats before a node is marked `Partitioned`.
    pub partition_detection_threshold: u32,
    /// Minimum live nodes required to accept quorum-sensitive operations.
    pub minimum_quorum_size: u32,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            distribution_type: "in-memory".to_string(),
            cluster_name: "neocache".to_string(),
            node_id: uuid::Uuid::new_v4().to_string(),
            consistency_level: "eventual".to_string(),
            replication_factor: 1,
            heartbeat_interval: 5,
            node_timeout: 30,
            partition_detection_threshold: 3,
            minimum_quorum_size: 1,
        }
    }
}

/// Token validator configuration, mirroring the original Keycloak token
/// manager's recognized options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Realm used when a call doesn't specify one.
    pub keycloak_admin_realm: String,
    /// JWT signing algorithm name (e.g. `RS256`, `HS256`).
    pub jwt_algorithm: String,
    /// Whether `aud` claim verification is enforced.
    pub jwt_verify_audience: bool,
    /// Whether `iss` claim verification is enforced.
    pub jwt_verify_issuer: bool,
    /// Expected audience, when verification is enabled.
    pub jwt_audience: Option<String>,
    /// Expected issuer, when verification is enabled.
    pub jwt_issuer: Option<String>,
    /// Seconds a validated-token cache entry lives.
    pub token_cache_ttl: u64,
    /// Seconds an introspection result is cached.
    pub introspection_cache_ttl: u64,
    /// Seconds a realm public key is cached.
    pub public_key_cache_ttl: u64,
    /// Seconds before expiry at which a token is eligible for refresh.
    pub refresh_threshold: u64,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            keycloak_admin_realm: "master".to_string(),
            jwt_algorithm: "RS256".to_string(),
            jwt_verify_audience: true,
            jwt_verify_issuer: true,
            jwt_audience: None,
            jwt_issuer: None,
            token_cache_ttl: 300,
            introspection_cache_ttl: 60,
            public_key_cache_ttl: 3600,
            refresh_threshold: 300,
        }
    }
}

/// Aggregate configuration covering every subsystem.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NeoCacheConfig {
    /// Cache engine options.
    pub cache: CacheConfig,
    /// Repository/backend options.
    pub repository: RepositoryConfig,
    /// Invalidation subsystem options.
    pub invalidation: InvalidationConfig,
    /// Distribution subsystem options.
    pub distribution: DistributionConfig,
    /// Token validator options.
    pub token: TokenConfig,
}

impl NeoCacheConfig {
    /// Validate the whole configuration tree.
    pub fn validate(&self) -> NeoCacheResult<()> {
        self.cache.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(NeoCacheConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_unknown_backend() {
        let mut cfg = CacheConfig::default();
        cfg.backend = "spanner".to_string();
        assert!(cfg.validate().is_err());
    }
}
