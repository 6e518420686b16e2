//! # neocache
//!
//! A multi-tier cache platform with pluggable storage backends,
//! hierarchical namespaces, pattern-based invalidation, scheduled and
//! event-driven invalidation with dependency cascades, cross-node
//! coordination, and a token validation cache wrapping an external
//! identity provider.
//!
//! ## Architecture
//!
//! - `value_objects`: validated immutable descriptors (key, TTL,
//!   priority, size, pattern)
//! - `model`: entries and namespaces
//! - `serializer`: bytes ↔ value with optional compression
//! - `repository`: backend-agnostic storage contract (memory, external KV)
//! - `manager`: cache facade (get/set/delete/get-or-compute, namespacing)
//! - `invalidation`: pattern scan, dependency cascade, scheduler, event triggers
//! - `distribution`: node registry, event fan-out, conflict resolution
//! - `events`: domain-event emission with batching
//! - `health`: component probing and aggregation
//! - `token`: dual validation, refresh coalescing, revocation
//! - `config`: runtime configuration for every subsystem
//! - `error`: crate-wide error taxonomy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod value_objects;
pub mod model;
pub mod serializer;
pub mod repository;
pub mod manager;
pub mod invalidation;
pub mod distribution;
pub mod events;
pub mod health;
pub mod token;

pub use config::NeoCacheConfig;
pub use error::{NeoCacheError, NeoCacheResult};
pub use manager::{CacheManager, CacheManagerBuilder};
pub use model::{EvictionPolicy, Entry, Namespace, NamespacePolicy};
pub use value_objects::{InvalidationPattern, Key, PatternKind, Priority, SizeBytes, Ttl};

/// Crate version, as declared in `Cargo.toml`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, as declared in `Cargo.toml`.
pub const NAME: &str = env!("CARGO_PKG_NAME");
