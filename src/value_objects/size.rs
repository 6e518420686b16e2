//! Entry size value object.

use serde::{Deserialize, Serialize};

use crate::error::{NeoCacheError, NeoCacheResult};

/// One gibibyte, the maximum size of a single cache entry.
pub const MAX_SIZE_BYTES: u64 = 1 << 30;

/// A validated entry size in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SizeBytes(u64);

impl SizeBytes {
    /// Construct a size, rejecting values above [`MAX_SIZE_BYTES`].
    pub fn new(bytes: u64) -> NeoCacheResult<Self> {
        if bytes > MAX_SIZE_BYTES {
            return Err(NeoCacheError::CapacityExceeded {
                current: bytes,
                limit: MAX_SIZE_BYTES,
                operation: "entry_size".to_string(),
            });
        }
        Ok(Self(bytes))
    }

    /// Raw byte count.
    pub fn bytes(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_over_one_gib() {
        assert!(SizeBytes::new(MAX_SIZE_BYTES).is_ok());
        assert!(SizeBytes::new(MAX_SIZE_BYTES + 1).is_err());
    }
}
