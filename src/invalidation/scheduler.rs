//! Scheduled (delayed/recurring) invalidation records.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use uuid::Uuid;

use crate::value_objects::Key;

/// A single scheduled removal, one-shot or recurring.
#[derive(Debug, Clone)]
pub struct ScheduledInvalidation {
    /// Unique identifier.
    pub id: Uuid,
    /// Key to invalidate.
    pub key: Key,
    /// Namespace the key lives in.
    pub namespace: String,
    /// When this entry is next due.
    pub execute_at: DateTime<Utc>,
    /// Human-readable reason, surfaced in logs/events.
    pub reason: String,
    /// Once true, the tick loop skips (and eventually prunes) this entry.
    pub cancelled: bool,
    /// Whether `execute_at` advances by `interval` instead of being removed.
    pub recurring: bool,
    /// Recurrence interval, required when `recurring` is true.
    pub interval: Option<ChronoDuration>,
}

impl ScheduledInvalidation {
    /// Construct a new schedule entry due `delay` from now.
    pub fn new(
        key: Key,
        namespace: impl Into<String>,
        delay: ChronoDuration,
        reason: impl Into<String>,
        recurring: bool,
        interval: Option<ChronoDuration>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            namespace: namespace.into(),
            execute_at: Utc::now() + delay,
            reason: reason.into(),
            cancelled: false,
            recurring,
            interval,
        }
    }

    /// Whether this entry is due as of `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        !self.cancelled && self.execute_at <= now
    }

    /// Advance `execute_at` by `interval` after a recurring execution.
    pub fn reschedule(&mut self) {
        if let Some(interval) = self.interval {
            self.execute_at += interval;
        }
    }
}
