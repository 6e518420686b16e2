//! Crate-wide error taxonomy.
//!
//! One enum for every failure domain named in the specification's error
//! handling design, following the same shape as a single `thiserror`
//! enum per concern rather than one exception type per module.

use thiserror::Error;

/// Errors produced anywhere in the cache engine, invalidation subsystem,
/// distribution subsystem, or token validator.
#[derive(Error, Debug)]
pub enum NeoCacheError {
    /// Key failed validation (empty, too long/short, forbidden characters).
    #[error("invalid key: {0}")]
    KeyInvalid(String),

    /// Namespace name failed validation.
    #[error("invalid namespace: {0}")]
    NamespaceInvalid(String),

    /// An operation exceeded its configured deadline.
    #[error("operation {operation} timed out after {elapsed_ms}ms (limit {timeout_ms}ms)")]
    Timeout {
        /// Name of the operation that timed out.
        operation: String,
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
        /// Elapsed time in milliseconds when the timeout fired.
        elapsed_ms: u64,
    },

    /// A size/entry-count/memory/key-length limit was exceeded.
    #[error("capacity exceeded for {operation}: {current}/{limit}")]
    CapacityExceeded {
        /// Current measured value.
        current: u64,
        /// Configured limit.
        limit: u64,
        /// Operation that triggered the check.
        operation: String,
    },

    /// Encoding a value to bytes failed.
    #[error("serialization error ({format}): {cause}")]
    SerializationError {
        /// Format name (`json`, `bincode`, `messagepack`).
        format: String,
        /// Underlying cause.
        cause: String,
        /// Whether a fallback serializer or retry could plausibly succeed.
        recoverable: bool,
    },

    /// Decoding bytes to a value failed.
    #[error("deserialization error ({format}): {cause}")]
    DeserializationError {
        /// Format name (`json`, `bincode`, `messagepack`).
        format: String,
        /// Underlying cause.
        cause: String,
        /// Whether a fallback serializer or retry could plausibly succeed.
        recoverable: bool,
    },

    /// A pattern failed to compile or exceeded a complexity limit.
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// Cross-node coordination failed (unreachable node, lost quorum,
    /// unresolvable conflict).
    #[error("distribution error: {0}")]
    DistributionError(String),

    /// Token failed validation and must be treated as unauthenticated.
    #[error("unauthorized token: {0}")]
    UnauthorizedToken(String),

    /// Token refresh could not complete.
    #[error("token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// Token revocation could not complete.
    #[error("token revocation failed: {0}")]
    TokenRevocationFailed(String),

    /// Backing store failure not otherwise classified.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result type returned by fallible operations throughout this crate.
pub type NeoCacheResult<T> = Result<T, NeoCacheError>;
