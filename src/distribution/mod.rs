//! Cross-node coordination (spec §4.5).
//!
//! Node membership, event fan-out, and pluggable conflict resolution over
//! a [`Transport`]. Grounded in the teacher's `DashMap`-backed registries
//! (`enterprise::cache::lock`) for node/subscription bookkeeping and in
//! `enterprise::cache::invalidation::PubSubInvalidator` for the
//! broadcast-channel transport shape.

pub mod conflict;
pub mod node;
pub mod transport;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

pub use conflict::{ConflictResolver, ConflictingValue, LatestTimestampResolver, LogOffsetResolver};
pub use node::{NodeRecord, NodeStatus};
pub use transport::{Envelope, InMemoryTransport, Transport};

use crate::config::DistributionConfig;
use crate::error::{NeoCacheError, NeoCacheResult};

/// The five cache-coordination event kinds spec §4.5 names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DistributionEventKind {
    /// A value was written on the origin node.
    CacheSet,
    /// A key was removed on the origin node.
    CacheDelete,
    /// A pattern/key invalidation ran on the origin node.
    CacheInvalidate,
    /// A namespace was flushed on the origin node.
    NamespaceFlush,
    /// A pattern-based invalidation ran (distinct from a single-key one).
    PatternInvalidate,
}

impl DistributionEventKind {
    /// Wire name used as the envelope `event_type`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CacheSet => "cache_set",
            Self::CacheDelete => "cache_delete",
            Self::CacheInvalidate => "cache_invalidate",
            Self::NamespaceFlush => "namespace_flush",
            Self::PatternInvalidate => "pattern_invalidate",
        }
    }
}

const HEARTBEAT_EVENT: &str = "__heartbeat__";
const CONFLICT_EVENT: &str = "__conflict__";

type Callback = Arc<dyn Fn(Envelope) + Send + Sync>;

struct Subscription {
    types: HashSet<String>,
    namespace_filter: Option<String>,
    callback: Callback,
}

impl Subscription {
    fn matches(&self, envelope: &Envelope) -> bool {
        if !self.types.is_empty() && !self.types.contains(&envelope.event_type) {
            return false;
        }
        match (&self.namespace_filter, &envelope.namespace) {
            (Some(filter), Some(ns)) => filter == ns,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }
}

/// Multi-node cache coordinator.
pub struct Distributor {
    node_id: String,
    config: DistributionConfig,
    nodes: DashMap<String, NodeRecord>,
    subscriptions: DashMap<Uuid, Subscription>,
    transport: Arc<dyn Transport>,
    conflict_resolver: Arc<dyn ConflictResolver<Value>>,
}

impl Distributor {
    /// Register this node and construct a coordinator around `transport`.
    pub fn new(
        config: DistributionConfig,
        address: impl Into<String>,
        capabilities: Vec<String>,
        transport: Arc<dyn Transport>,
        conflict_resolver: Arc<dyn ConflictResolver<Value>>,
    ) -> Self {
        let node_id = config.node_id.clone();
        let nodes = DashMap::new();
        nodes.insert(node_id.clone(), NodeRecord::new(node_id.clone(), address, capabilities));
        Self {
            node_id,
            config,
            nodes,
            subscriptions: DashMap::new(),
            transport,
            conflict_resolver,
        }
    }

    /// This node's id.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    fn topic(&self, event_type: &str, namespace: Option<&str>) -> String {
        match namespace {
            Some(ns) => format!("{}.{}.{}", self.config.cluster_name, event_type, ns),
            None => format!("{}.{}", self.config.cluster_name, event_type),
        }
    }

    /// Add or refresh a peer's membership record.
    pub fn register_node(&self, node_id: impl Into<String>, address: impl Into<String>, capabilities: Vec<String>) {
        let node_id = node_id.into();
        self.nodes.insert(node_id.clone(), NodeRecord::new(node_id, address, capabilities));
    }

    /// Remove a peer's membership record.
    pub fn unregister_node(&self, node_id: &str) -> bool {
        self.nodes.remove(node_id).is_some()
    }

    /// Every node currently believed `Active`.
    pub fn get_active_nodes(&self) -> Vec<NodeRecord> {
        self.nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Active)
            .map(|n| n.value().clone())
            .collect()
    }

    /// Whether `node_id` is registered and not expired.
    pub fn ping_node(&self, node_id: &str) -> bool {
        self.nodes
            .get(node_id)
            .map(|n| !n.is_expired(Utc::now(), chrono::Duration::seconds(self.config.node_timeout as i64)))
            .unwrap_or(false)
    }

    /// Publish a typed event; `target_nodes` limits delivery when `Some`.
    pub async fn publish_event(
        &self,
        event_type: DistributionEventKind,
        key: Option<&str>,
        namespace: Option<&str>,
        data: Option<Value>,
        target_nodes: Option<Vec<String>>,
    ) -> NeoCacheResult<()> {
        let _topic = self.topic(event_type.as_str(), namespace);
        let envelope = Envelope {
            event_type: event_type.as_str().to_string(),
            key: key.map(str::to_string),
            namespace: namespace.map(str::to_string),
            data,
            origin_node: self.node_id.clone(),
            timestamp: Utc::now(),
            log_offset: None,
            target_nodes,
        };
        self.transport.publish(envelope).await
    }

    /// Register a callback invoked for every matching future event.
    pub fn subscribe_to_events(
        &self,
        types: &[DistributionEventKind],
        namespace_filter: Option<String>,
        callback: Callback,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let types = types.iter().map(|t| t.as_str().to_string()).collect();
        self.subscriptions.insert(
            id,
            Subscription {
                types,
                namespace_filter,
                callback,
            },
        );
        id
    }

    /// Remove a previously registered subscription.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        self.subscriptions.remove(&id).is_some()
    }

    /// Notify peers that `key` in `namespace` is no longer valid.
    pub async fn broadcast_invalidation(&self, key: &str, namespace: &str) -> NeoCacheResult<()> {
        self.publish_event(DistributionEventKind::CacheInvalidate, Some(key), Some(namespace), None, None)
            .await
    }

    /// Notify peers that `namespace` was flushed.
    pub async fn broadcast_namespace_flush(&self, namespace: &str) -> NeoCacheResult<()> {
        self.publish_event(DistributionEventKind::NamespaceFlush, None, Some(namespace), None, None)
            .await
    }

    /// Notify peers of a write so they can invalidate or replicate it.
    pub async fn coordinate_cache_set(&self, key: &str, namespace: &str, value: Value) -> NeoCacheResult<()> {
        self.publish_event(DistributionEventKind::CacheSet, Some(key), Some(namespace), Some(value), None)
            .await
    }

    /// Whether enough active nodes are present to satisfy
    /// `minimum_quorum_size`.
    pub fn check_consistency(&self) -> NeoCacheResult<bool> {
        let active = self.get_active_nodes().len() as u32;
        if active < self.config.minimum_quorum_size {
            return Err(NeoCacheError::DistributionError(format!(
                "quorum lost: {active} active nodes, need {}",
                self.config.minimum_quorum_size
            )));
        }
        Ok(true)
    }

    /// Resolve a conflicting set of candidate values, publishing the
    /// decision (and the losing candidates) on the conflict topic for
    /// observability.
    pub async fn resolve_conflict(&self, candidates: &[ConflictingValue<Value>]) -> NeoCacheResult<Option<ConflictingValue<Value>>> {
        let resolved = self.conflict_resolver.resolve(candidates);
        if let Some(winner) = &resolved {
            let data = serde_json::json!({
                "winner_node": winner.node_id,
                "candidate_count": candidates.len(),
            });
            let envelope = Envelope {
                event_type: CONFLICT_EVENT.to_string(),
                key: None,
                namespace: None,
                data: Some(data),
                origin_node: self.node_id.clone(),
                timestamp: Utc::now(),
                log_offset: None,
                target_nodes: None,
            };
            self.transport.publish(envelope).await?;
        }
        Ok(resolved)
    }

    /// Ask `authoritative_node` (or let the conflict resolver pick) to
    /// republish its value so peers can converge.
    pub async fn repair_consistency(&self, authoritative_node: Option<&str>) -> NeoCacheResult<()> {
        let data = serde_json::json!({ "authoritative_node": authoritative_node });
        let envelope = Envelope {
            event_type: "__repair__".to_string(),
            key: None,
            namespace: None,
            data: Some(data),
            origin_node: self.node_id.clone(),
            timestamp: Utc::now(),
            log_offset: None,
            target_nodes: None,
        };
        self.transport.publish(envelope).await
    }

    /// Mark a set of nodes `Partitioned` without removing them.
    pub fn handle_network_partition(&self, partitioned_nodes: &[String]) {
        for id in partitioned_nodes {
            if let Some(mut n) = self.nodes.get_mut(id) {
                n.status = NodeStatus::Partitioned;
            }
        }
    }

    /// Reunite previously partitioned groups, marking every named node
    /// `Active` again.
    pub fn merge_partitions(&self, groups: &[Vec<String>]) {
        for group in groups {
            for id in group {
                if let Some(mut n) = self.nodes.get_mut(id) {
                    n.status = NodeStatus::Active;
                    n.missed_heartbeats = 0;
                }
            }
        }
    }

    /// Deterministically order active nodes for `(namespace, key)` via
    /// `hash(namespace + key)`, so repeated calls route consistently.
    pub fn get_preferred_nodes(&self, namespace: &str, key: &str, _op: &str) -> Vec<String> {
        let mut active: Vec<String> = self.get_active_nodes().into_iter().map(|n| n.node_id).collect();
        if active.is_empty() {
            return active;
        }
        active.sort();
        let hash = seahash(&format!("{namespace}{key}"));
        let start = (hash as usize) % active.len();
        active.rotate_left(start);
        active
    }

    /// Return the single most-preferred node for an operation.
    pub fn route_operation(&self, namespace: &str, key: &str, op: &str) -> Option<String> {
        self.get_preferred_nodes(namespace, key, op).into_iter().next()
    }

    /// Run one heartbeat emission: touch this node's own record and
    /// publish a heartbeat envelope for peers to observe.
    pub async fn emit_heartbeat(&self) -> NeoCacheResult<()> {
        if let Some(mut n) = self.nodes.get_mut(&self.node_id) {
            n.record_heartbeat();
        }
        let data = serde_json::json!({ "node_id": self.node_id });
        let envelope = Envelope {
            event_type: HEARTBEAT_EVENT.to_string(),
            key: None,
            namespace: None,
            data: Some(data),
            origin_node: self.node_id.clone(),
            timestamp: Utc::now(),
            log_offset: None,
            target_nodes: None,
        };
        self.transport.publish(envelope).await
    }

    /// Sweep the node table: nodes silent past `node_timeout` are removed;
    /// nodes silent past `partition_detection_threshold` heartbeat
    /// intervals (but not yet timed out) are marked `Partitioned`.
    pub fn run_cleanup_tick(&self) {
        let now = Utc::now();
        let node_timeout = chrono::Duration::seconds(self.config.node_timeout as i64);
        let heartbeat_interval = chrono::Duration::seconds(self.config.heartbeat_interval as i64);
        let mut expired = Vec::new();
        for entry in self.nodes.iter() {
            if entry.node_id == self.node_id {
                continue;
            }
            if entry.is_expired(now, node_timeout) {
                expired.push(entry.node_id.clone());
            }
        }
        for id in expired {
            self.nodes.remove(&id);
        }
        for mut entry in self.nodes.iter_mut() {
            if entry.node_id == self.node_id {
                continue;
            }
            let missed = entry.note_missed_interval_if_silent(now, heartbeat_interval);
            if missed >= self.config.partition_detection_threshold && entry.status == NodeStatus::Active {
                entry.status = NodeStatus::Partitioned;
            }
        }
    }

    /// Dispatch one received envelope to every matching subscription, and
    /// apply heartbeats to the node table.
    fn handle_envelope(&self, envelope: &Envelope) {
        if envelope.event_type == HEARTBEAT_EVENT {
            if let Some(mut n) = self.nodes.get_mut(&envelope.origin_node) {
                n.record_heartbeat();
            }
            return;
        }
        for sub in self.subscriptions.iter() {
            if sub.matches(envelope) {
                (sub.callback)(envelope.clone());
            }
        }
    }

    /// Spawn the heartbeat emitter loop.
    pub fn spawn_heartbeat_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = Duration::from_secs(self.config.heartbeat_interval.max(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.emit_heartbeat().await {
                    tracing::warn!(error = %e, "heartbeat publish failed");
                }
            }
        })
    }

    /// Spawn the envelope consumer loop.
    pub fn spawn_consumer_loop(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let mut receiver = self.transport.subscribe();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(envelope) => self.handle_envelope(&envelope),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "distributor consumer lagged behind transport");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    /// Spawn the stale-node cleanup loop.
    pub fn spawn_cleanup_loop(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.run_cleanup_tick();
            }
        })
    }
}

/// Small, dependency-free string hash used only for deterministic node
/// routing, not for anything security-sensitive.
fn seahash(s: &str) -> u64 {
    let mut hash: u64 = 1469598103934665603;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(1099511628211);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn distributor(transport: Arc<dyn Transport>) -> Arc<Distributor> {
        let mut config = DistributionConfig::default();
        config.minimum_quorum_size = 1;
        Arc::new(Distributor::new(
            config,
            "127.0.0.1:0",
            vec!["cache".to_string()],
            transport,
            Arc::new(LatestTimestampResolver),
        ))
    }

    #[test]
    fn register_and_unregister_node() {
        let d = distributor(Arc::new(InMemoryTransport::default()));
        d.register_node("peer-1", "10.0.0.1:9000", vec![]);
        assert!(d.ping_node("peer-1"));
        assert!(d.unregister_node("peer-1"));
        assert!(!d.ping_node("peer-1"));
    }

    #[test]
    fn check_consistency_fails_below_quorum() {
        let mut config = DistributionConfig::default();
        config.minimum_quorum_size = 3;
        let d = Distributor::new(config, "addr", vec![], Arc::new(InMemoryTransport::default()), Arc::new(LatestTimestampResolver));
        assert!(d.check_consistency().is_err());
    }

    #[test]
    fn get_preferred_nodes_is_deterministic() {
        let d = distributor(Arc::new(InMemoryTransport::default()));
        d.register_node("peer-1", "a", vec![]);
        d.register_node("peer-2", "b", vec![]);
        let first = d.get_preferred_nodes("users", "42", "get");
        let second = d.get_preferred_nodes("users", "42", "get");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn subscriber_receives_matching_broadcast_invalidation() {
        let transport = Arc::new(InMemoryTransport::default());
        let d = distributor(transport.clone());
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();
        d.subscribe_to_events(
            &[DistributionEventKind::CacheInvalidate],
            Some("users".to_string()),
            Arc::new(move |_env| {
                seen_clone.fetch_add(1, Ordering::SeqCst);
            }),
        );
        let consumer = d.clone().spawn_consumer_loop();
        d.broadcast_invalidation("user:1:profile", "users").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        consumer.abort();
    }

    #[tokio::test]
    async fn heartbeat_refreshes_peer_record_via_consumer_loop() {
        let transport = Arc::new(InMemoryTransport::default());
        let d = distributor(transport.clone());
        d.register_node("peer-1", "addr", vec![]);
        let consumer = d.clone().spawn_consumer_loop();
        let envelope = Envelope {
            event_type: HEARTBEAT_EVENT.to_string(),
            key: None,
            namespace: None,
            data: None,
            origin_node: "peer-1".to_string(),
            timestamp: Utc::now(),
            log_offset: None,
            target_nodes: None,
        };
        transport.publish(envelope).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(d.ping_node("peer-1"));
        consumer.abort();
    }
}
