//! Gzip payload codec.
//!
//! The agent-side encoder draws its output buffer from a free-list so that a
//! busy send pool reuses allocations instead of growing a fresh buffer per
//! request. Compression level is fixed at [`Compression::fast`]; ingest
//! payloads are short-lived and latency matters more than ratio.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};
use std::ops::Deref;
use std::sync::Mutex;

/// Free-list of reusable gzip output buffers.
pub struct GzipPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl Default for GzipPool {
    fn default() -> Self {
        Self::new()
    }
}

impl GzipPool {
    pub fn new() -> Self {
        Self {
            free: Mutex::new(Vec::new()),
        }
    }

    /// Compresses `data` into a pooled buffer. The buffer returns to the
    /// free-list when the lease is dropped.
    pub fn compress(&self, data: &[u8]) -> io::Result<GzipLease<'_>> {
        let mut buf = self
            .free
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop()
            .unwrap_or_default();
        buf.clear();

        let mut encoder = GzEncoder::new(buf, Compression::fast());
        encoder.write_all(data)?;
        // finish() flushes the trailing gzip frame; skipping it truncates the
        // stream.
        let buf = encoder.finish()?;
        Ok(GzipLease {
            pool: self,
            buf: Some(buf),
        })
    }
}

/// Borrowed compressed payload; hands its buffer back to the pool on drop.
pub struct GzipLease<'a> {
    pool: &'a GzipPool,
    buf: Option<Vec<u8>>,
}

impl Deref for GzipLease<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or_default()
    }
}

impl Drop for GzipLease<'_> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool
                .free
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .push(buf);
        }
    }
}

/// One-shot gzip encode without pooling, for callers off the hot path.
pub fn encode(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decodes a gzip stream fully into memory.
pub fn decode(data: &[u8]) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_decode_roundtrip() {
        let data = b"a payload that should survive the trip".to_vec();
        let compressed = encode(&data).unwrap();
        assert_ne!(compressed, data);
        assert_eq!(decode(&compressed).unwrap(), data);
    }

    #[test]
    fn pooled_compress_roundtrip() {
        let pool = GzipPool::new();
        let data = vec![7u8; 4096];
        let lease = pool.compress(&data).unwrap();
        assert_eq!(decode(&lease).unwrap(), data);
    }

    #[test]
    fn pool_reuses_buffers() {
        let pool = GzipPool::new();
        {
            let _lease = pool.compress(b"first").unwrap();
        }
        assert_eq!(pool.free.lock().unwrap().len(), 1);
        {
            let _lease = pool.compress(b"second").unwrap();
            // buffer checked out again
            assert_eq!(pool.free.lock().unwrap().len(), 0);
        }
        assert_eq!(pool.free.lock().unwrap().len(), 1);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode(b"definitely not gzip").is_err());
    }
}
