//! Node registry records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Liveness state of a registered node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Heartbeating normally.
    Active,
    /// Unregistered or expired past `node_timeout`.
    Inactive,
    /// Missed `partition_detection_threshold` heartbeats, but not yet expired.
    Partitioned,
    /// Declared unreachable by an operator action (`handle_network_partition`).
    Failed,
}

/// A node's membership record, grounded in the teacher's `DashMap`-backed
/// lock-holder registries in `lock.rs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Unique node identifier.
    pub node_id: String,
    /// Address or endpoint other nodes use to reach this one.
    pub address: String,
    /// Current liveness state.
    pub status: NodeStatus,
    /// Timestamp of the most recently observed heartbeat.
    pub last_heartbeat: DateTime<Utc>,
    /// Declared capabilities (e.g. `["cache", "invalidation"]`).
    pub capabilities: Vec<String>,
    /// Heartbeats missed since the last one that was observed.
    pub missed_heartbeats: u32,
}

impl NodeRecord {
    /// Register a fresh, active node record.
    pub fn new(node_id: impl Into<String>, address: impl Into<String>, capabilities: Vec<String>) -> Self {
        Self {
            node_id: node_id.into(),
            address: address.into(),
            status: NodeStatus::Active,
            last_heartbeat: Utc::now(),
            capabilities,
            missed_heartbeats: 0,
        }
    }

    /// Record an observed heartbeat, reviving the node to `Active`.
    pub fn record_heartbeat(&mut self) {
        self.last_heartbeat = Utc::now();
        self.missed_heartbeats = 0;
        self.status = NodeStatus::Active;
    }

    /// Whether this record has expired entirely (`now - last_heartbeat >
    /// node_timeout`).
    pub fn is_expired(&self, now: DateTime<Utc>, node_timeout: chrono::Duration) -> bool {
        now - self.last_heartbeat > node_timeout
    }

    /// Whether a new heartbeat interval has elapsed with nothing heard;
    /// bumps `missed_heartbeats` and reports the new count.
    pub fn note_missed_interval_if_silent(&mut self, now: DateTime<Utc>, heartbeat_interval: chrono::Duration) -> u32 {
        let expected_missed = ((now - self.last_heartbeat).num_milliseconds() / heartbeat_interval.num_milliseconds().max(1)) as u32;
        if expected_missed > self.missed_heartbeats {
            self.missed_heartbeats = expected_missed;
        }
        self.missed_heartbeats
    }
}
