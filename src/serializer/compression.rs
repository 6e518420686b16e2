//! Gzip compression envelope.
//!
//! The `"GZIP:"` 5-byte magic prefix is load-bearing for cross-language
//! portability when an external-KV backend is shared with other
//! implementations of this system; it must stay exact.

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Magic prefix marking gzip-compressed payloads.
pub const MAGIC_PREFIX: &[u8] = b"GZIP:";

/// Compress `bytes` and prefix with [`MAGIC_PREFIX`] when `bytes.len() >=
/// threshold` AND the compressed output is strictly smaller than the
/// input; otherwise return `bytes` unchanged.
pub fn compress_if_beneficial(bytes: &[u8], threshold: usize) -> Vec<u8> {
    if bytes.len() < threshold {
        return bytes.to_vec();
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    if encoder.write_all(bytes).is_err() {
        return bytes.to_vec();
    }
    match encoder.finish() {
        Ok(compressed) if compressed.len() < bytes.len() => {
            let mut out = Vec::with_capacity(MAGIC_PREFIX.len() + compressed.len());
            out.extend_from_slice(MAGIC_PREFIX);
            out.extend_from_slice(&compressed);
            out
        }
        _ => bytes.to_vec(),
    }
}

/// Inflate `bytes` if they carry the [`MAGIC_PREFIX`]; otherwise return
/// them unchanged.
pub fn decompress_if_needed(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    if bytes.starts_with(MAGIC_PREFIX) {
        let mut decoder = GzDecoder::new(&bytes[MAGIC_PREFIX.len()..]);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out)?;
        Ok(out)
    } else {
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_large_compressible_payload() {
        let payload = vec![b'a'; 10_000];
        let compressed = compress_if_beneficial(&payload, 1024);
        assert!(compressed.starts_with(MAGIC_PREFIX));
        assert!(compressed.len() < payload.len());
        let restored = decompress_if_needed(&compressed).unwrap();
        assert_eq!(restored, payload);
    }

    #[test]
    fn skips_compression_below_threshold() {
        let payload = vec![b'a'; 10];
        let out = compress_if_beneficial(&payload, 1024);
        assert_eq!(out, payload);
    }

    #[test]
    fn skips_compression_when_not_beneficial() {
        // Random-ish bytes that gzip won't shrink meaningfully once
        // overhead is included, by construction incompressible-enough at
        // this size.
        let payload: Vec<u8> = (0u16..2000).map(|i| (i % 251) as u8).collect();
        let out = decompress_if_needed(&compress_if_beneficial(&payload, 1)).unwrap();
        assert_eq!(out, payload);
    }

    #[test]
    fn passthrough_without_magic_prefix() {
        let payload = b"plain bytes".to_vec();
        assert_eq!(decompress_if_needed(&payload).unwrap(), payload);
    }
}
