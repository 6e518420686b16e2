//! Serializer usage statistics.

use std::time::Duration;

/// Running counters for a serializer instance.
#[derive(Debug, Clone, Default)]
pub struct SerializerStats {
    /// Successful `serialize` calls.
    pub encode_count: u64,
    /// Successful `deserialize` calls.
    pub decode_count: u64,
    /// Total bytes passed into `serialize`.
    pub total_bytes_in: u64,
    /// Total bytes produced by `serialize` (post-compression).
    pub total_bytes_out: u64,
    /// Cumulative time spent encoding.
    pub total_encode_time: Duration,
    /// Cumulative time spent decoding.
    pub total_decode_time: Duration,
    /// Failed encode/decode attempts.
    pub errors: u64,
}

impl SerializerStats {
    /// Record a successful encode.
    pub fn record_encode(&mut self, bytes_in: usize, bytes_out: usize, elapsed: Duration) {
        self.encode_count += 1;
        self.total_bytes_in += bytes_in as u64;
        self.total_bytes_out += bytes_out as u64;
        self.total_encode_time += elapsed;
    }

    /// Record a successful decode.
    pub fn record_decode(&mut self, elapsed: Duration) {
        self.decode_count += 1;
        self.total_decode_time += elapsed;
    }

    /// Record a failure.
    pub fn record_error(&mut self) {
        self.errors += 1;
    }

    /// Overall compression ratio (`bytes_out / bytes_in`), or `1.0` absent data.
    pub fn compression_ratio(&self) -> f64 {
        if self.total_bytes_in == 0 {
            1.0
        } else {
            self.total_bytes_out as f64 / self.total_bytes_in as f64
        }
    }
}
