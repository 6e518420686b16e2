//! TTL value object with `NEVER_EXPIRE`/`INSTANT_EXPIRE` sentinels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{NeoCacheError, NeoCacheResult};

/// Sentinel meaning "never expires".
pub const NEVER_EXPIRE: i64 = -1;
/// Sentinel meaning "expires immediately".
pub const INSTANT_EXPIRE: i64 = 0;

/// A validated TTL in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ttl(i64);

impl Ttl {
    /// Construct a TTL, rejecting values below `NEVER_EXPIRE`.
    pub fn new(seconds: i64) -> NeoCacheResult<Self> {
        if seconds < NEVER_EXPIRE {
            return Err(NeoCacheError::CapacityExceeded {
                current: seconds as u64,
                limit: NEVER_EXPIRE as u64,
                operation: "ttl".to_string(),
            });
        }
        Ok(Self(seconds))
    }

    /// A TTL that never expires.
    pub fn never_expire() -> Self {
        Self(NEVER_EXPIRE)
    }

    /// A TTL that expires instantly.
    pub fn instant_expire() -> Self {
        Self(INSTANT_EXPIRE)
    }

    /// Minutes-denominated TTL.
    pub fn minutes(n: i64) -> NeoCacheResult<Self> {
        Self::new(n * 60)
    }

    /// Hours-denominated TTL.
    pub fn hours(n: i64) -> NeoCacheResult<Self> {
        Self::new(n * 3600)
    }

    /// Days-denominated TTL.
    pub fn days(n: i64) -> NeoCacheResult<Self> {
        Self::new(n * 86_400)
    }

    /// Raw seconds value.
    pub fn seconds(&self) -> i64 {
        self.0
    }

    /// Whether this TTL never expires.
    pub fn is_never_expire(&self) -> bool {
        self.0 == NEVER_EXPIRE
    }

    /// Whether this TTL expires immediately.
    pub fn is_instant_expire(&self) -> bool {
        self.0 == INSTANT_EXPIRE
    }

    /// Whether an entry created at `created_at` is expired as of `now`.
    pub fn is_expired(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if self.is_never_expire() {
            return false;
        }
        if self.is_instant_expire() {
            return now >= created_at;
        }
        now >= created_at + chrono::Duration::seconds(self.0)
    }

    /// The moment at which an entry created at `created_at` expires, if ever.
    pub fn expiry_time(&self, created_at: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_never_expire() {
            None
        } else {
            Some(created_at + chrono::Duration::seconds(self.0))
        }
    }

    /// Extend this TTL by `additional_seconds`.
    pub fn extend(&self, additional_seconds: i64) -> NeoCacheResult<Self> {
        if self.is_never_expire() {
            return Ok(*self);
        }
        Self::new(self.0 + additional_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn never_expire_is_never_expired() {
        let ttl = Ttl::never_expire();
        let created = Utc::now() - Duration::days(3650);
        assert!(!ttl.is_expired(created, Utc::now()));
    }

    #[test]
    fn instant_expire_expires_immediately() {
        let ttl = Ttl::instant_expire();
        let created = Utc::now();
        assert!(ttl.is_expired(created, created));
    }

    #[test]
    fn finite_ttl_respects_boundary() {
        let ttl = Ttl::new(2).unwrap();
        let created = Utc::now();
        assert!(!ttl.is_expired(created, created + Duration::seconds(1)));
        assert!(ttl.is_expired(created, created + Duration::seconds(3)));
    }
}
