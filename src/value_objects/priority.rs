//! Eviction priority value object.

use serde::{Deserialize, Serialize};

/// Eviction priority. Lower numeric values are evicted first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Priority {
    /// Evicted first.
    Low = 1,
    /// Default priority.
    Medium = 5,
    /// Evicted after `Medium`.
    High = 10,
    /// Evicted last.
    Critical = 20,
}

impl Priority {
    /// Numeric weight used for eviction comparisons.
    pub fn weight(&self) -> u8 {
        *self as u8
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_eviction_order() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::Medium < Priority::High);
        assert!(Priority::High < Priority::Critical);
    }
}
