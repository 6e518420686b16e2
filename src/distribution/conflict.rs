//! Pluggable conflict resolution for concurrently written values.

use chrono::{DateTime, Utc};

/// One node's candidate value in a conflict, with enough metadata for
/// either resolver strategy to pick a winner.
#[derive(Debug, Clone)]
pub struct ConflictingValue<V> {
    /// Node that produced this value.
    pub node_id: String,
    /// The candidate value itself.
    pub value: V,
    /// Wall-clock time the write was made, per that node's clock.
    pub timestamp: DateTime<Utc>,
    /// Transport-assigned total order within a partition, when available.
    pub log_offset: Option<u64>,
}

/// Resolves a set of conflicting candidate values to a single winner.
pub trait ConflictResolver<V>: Send + Sync {
    /// Pick the authoritative candidate, or `None` if `candidates` is empty.
    fn resolve(&self, candidates: &[ConflictingValue<V>]) -> Option<ConflictingValue<V>>
    where
        V: Clone;
}

/// Last-write-wins by wall-clock timestamp.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatestTimestampResolver;

impl<V> ConflictResolver<V> for LatestTimestampResolver {
    fn resolve(&self, candidates: &[ConflictingValue<V>]) -> Option<ConflictingValue<V>>
    where
        V: Clone,
    {
        candidates.iter().max_by_key(|c| c.timestamp).cloned()
    }
}

/// Picks the candidate with the highest transport log offset, falling back
/// to [`LatestTimestampResolver`] when no candidate carries one (the
/// transport does not provide total order).
#[derive(Debug, Clone, Copy, Default)]
pub struct LogOffsetResolver;

impl<V> ConflictResolver<V> for LogOffsetResolver {
    fn resolve(&self, candidates: &[ConflictingValue<V>]) -> Option<ConflictingValue<V>>
    where
        V: Clone,
    {
        if candidates.iter().any(|c| c.log_offset.is_some()) {
            candidates.iter().max_by_key(|c| c.log_offset.unwrap_or(0)).cloned()
        } else {
            LatestTimestampResolver.resolve(candidates)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(node: &str, ts_secs: i64, offset: Option<u64>) -> ConflictingValue<String> {
        ConflictingValue {
            node_id: node.to_string(),
            value: format!("{node}-value"),
            timestamp: DateTime::from_timestamp(ts_secs, 0).unwrap(),
            log_offset: offset,
        }
    }

    #[test]
    fn latest_timestamp_picks_newest() {
        let a = candidate("a", 100, None);
        let b = candidate("b", 200, None);
        let resolved = LatestTimestampResolver.resolve(&[a, b]).unwrap();
        assert_eq!(resolved.node_id, "b");
    }

    #[test]
    fn log_offset_prefers_offset_over_timestamp() {
        let a = candidate("a", 200, Some(1));
        let b = candidate("b", 100, Some(5));
        let resolved = LogOffsetResolver.resolve(&[a, b]).unwrap();
        assert_eq!(resolved.node_id, "b");
    }

    #[test]
    fn log_offset_falls_back_to_timestamp_without_offsets() {
        let a = candidate("a", 100, None);
        let b = candidate("b", 200, None);
        let resolved = LogOffsetResolver.resolve(&[a, b]).unwrap();
        assert_eq!(resolved.node_id, "b");
    }
}
