//! Bytes-to-value serialization with an optional compression envelope.
//!
//! Three concrete formats are provided behind a shared
//! [`CacheSerializer`] trait: [`formats::JsonFormat`] (structured-text),
//! [`formats::BincodeFormat`] (protocol-versioned binary), and
//! [`formats::MessagePackFormat`] (compact binary with tagged
//! extensions). Any format may apply the gzip envelope from
//! [`compression`] when beneficial.

pub mod compression;
pub mod formats;
pub mod stats;

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::NeoCacheResult;
pub use stats::SerializerStats;

/// Shared contract for all concrete serializers.
pub trait CacheSerializer<V>: Send + Sync {
    /// Encode `value` to bytes, applying the compression envelope when
    /// `compression_threshold` is exceeded and beneficial.
    fn serialize(&self, value: &V, compression_threshold: usize) -> NeoCacheResult<Vec<u8>>;

    /// Decode bytes previously produced by [`serialize`](Self::serialize).
    fn deserialize(&self, bytes: &[u8]) -> NeoCacheResult<V>;

    /// Best-effort size estimate without fully encoding, when cheap to
    /// compute; otherwise falls back to a real encode.
    fn estimate_size(&self, value: &V) -> NeoCacheResult<usize>
    where
        V: Serialize,
    {
        Ok(self.serialize(value, usize::MAX)?.len())
    }

    /// Whether this serializer can handle `value` at all (always true for
    /// the formats shipped here; kept as a hook for exotic value types).
    fn can_serialize(&self, _value: &V) -> bool {
        true
    }

    /// Format name, e.g. `"json"`, `"bincode"`, `"messagepack"`.
    fn format_name(&self) -> &'static str;

    /// MIME content type for this format.
    fn content_type(&self) -> &'static str;
}

/// Wraps any [`CacheSerializer`] with call-count/timing/byte statistics,
/// mirroring the teacher's tracked-codec pattern.
pub struct TrackedSerializer<V, S: CacheSerializer<V>> {
    inner: S,
    stats: Arc<Mutex<SerializerStats>>,
    _marker: std::marker::PhantomData<V>,
}

impl<V, S: CacheSerializer<V>> TrackedSerializer<V, S> {
    /// Wrap `inner`, starting with empty statistics.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            stats: Arc::new(Mutex::new(SerializerStats::default())),
            _marker: std::marker::PhantomData,
        }
    }

    /// Snapshot current statistics.
    pub fn stats(&self) -> SerializerStats {
        self.stats.lock().clone()
    }
}

impl<V, S: CacheSerializer<V>> CacheSerializer<V> for TrackedSerializer<V, S> {
    fn serialize(&self, value: &V, compression_threshold: usize) -> NeoCacheResult<Vec<u8>> {
        let start = Instant::now();
        match self.inner.serialize(value, compression_threshold) {
            Ok(bytes) => {
                self.stats.lock().record_encode(0, bytes.len(), start.elapsed());
                Ok(bytes)
            }
            Err(e) => {
                self.stats.lock().record_error();
                Err(e)
            }
        }
    }

    fn deserialize(&self, bytes: &[u8]) -> NeoCacheResult<V> {
        let start = Instant::now();
        match self.inner.deserialize(bytes) {
            Ok(v) => {
                self.stats.lock().record_decode(start.elapsed());
                Ok(v)
            }
            Err(e) => {
                self.stats.lock().record_error();
                Err(e)
            }
        }
    }

    fn format_name(&self) -> &'static str {
        self.inner.format_name()
    }

    fn content_type(&self) -> &'static str {
        self.inner.content_type()
    }
}

/// Build a [`CacheSerializer`] trait object for a config-selected format
/// name, matching the `serializer` cache-config option (`json`,
/// `bincode`, `messagepack`).
pub fn serializer_for<V>(name: &str) -> NeoCacheResult<Box<dyn CacheSerializer<V>>>
where
    V: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    match name {
        "json" => Ok(Box::new(formats::JsonFormat::default())),
        "bincode" => Ok(Box::new(formats::BincodeFormat::default())),
        "messagepack" => Ok(Box::new(formats::MessagePackFormat::default())),
        other => Err(crate::error::NeoCacheError::SerializationError {
            format: other.to_string(),
            cause: "unknown serializer name".to_string(),
            recoverable: false,
        }),
    }
}
