//! Message transport abstraction.
//!
//! The production transport (Redis pub/sub, a log stream, ...) is named
//! out of scope; [`InMemoryTransport`] is the in-process default and test
//! double, built on `tokio::sync::broadcast` exactly as the teacher's
//! `enterprise::cache::invalidation::PubSubInvalidator` does.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::{NeoCacheError, NeoCacheResult};

/// A single message moving over the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Logical event type (`cache_set`, `__heartbeat__`, `__conflict__`, ...).
    pub event_type: String,
    /// Key the event concerns, when applicable.
    pub key: Option<String>,
    /// Namespace the event concerns, when applicable.
    pub namespace: Option<String>,
    /// Event payload.
    pub data: Option<Value>,
    /// Node that published this envelope.
    pub origin_node: String,
    /// Publish time, per the origin node's clock.
    pub timestamp: DateTime<Utc>,
    /// Transport-assigned total order, when the transport provides one.
    pub log_offset: Option<u64>,
    /// Restrict delivery to these node ids; `None` means broadcast to all.
    pub target_nodes: Option<Vec<String>>,
}

/// Publish/subscribe transport used by the distributor.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `envelope` to every current and future subscriber.
    async fn publish(&self, envelope: Envelope) -> NeoCacheResult<()>;

    /// Obtain a fresh receiver over all envelopes published from now on.
    /// Dropping the receiver is how a subscriber "unsubscribes" from the
    /// transport itself; the distributor layer additionally tracks
    /// per-subscription filters on top of this raw feed.
    fn subscribe(&self) -> broadcast::Receiver<Envelope>;
}

/// In-process transport backed by a single broadcast channel.
pub struct InMemoryTransport {
    sender: broadcast::Sender<Envelope>,
}

impl InMemoryTransport {
    /// Construct a transport with a bounded channel of `capacity` envelopes.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    async fn publish(&self, envelope: Envelope) -> NeoCacheResult<()> {
        self.sender
            .send(envelope)
            .map(|_| ())
            .map_err(|e| NeoCacheError::DistributionError(e.to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.sender.subscribe()
    }
}
