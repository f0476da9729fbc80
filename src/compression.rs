//! LZ4 compression for content blob payloads
//!
//! Blob bytes are framed with a 4-byte header so the reader never has to
//! guess the encoding:
//! - `LZ4C`: LZ4 block with prepended size follows
//! - `\0\0\0\0`: raw bytes follow
//!
//! Content hashes are always computed over the raw bytes, never the payload,
//! so switching strategies between runs does not affect deduplication.
//!
//! ## Examples
//!
//! ```rust
//! use cairn::compression::{CompressionEngine, CompressionStrategy};
//!
//! let engine = CompressionEngine::new(CompressionStrategy::Fast);
//! let data = b"Hello, world! ".repeat(200);
//! let payload = engine.compress(&data);
//! assert!(payload.len() < data.len());
//! assert_eq!(engine.decompress(&payload).unwrap(), data);
//! ```

use crate::error::{CairnError, Result};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Header marking an LZ4 payload
const LZ4_MAGIC: &[u8; 4] = b"LZ4C";

/// Header marking a raw payload
const RAW_MAGIC: &[u8; 4] = &[0, 0, 0, 0];

/// Content shorter than this is stored raw under [`CompressionStrategy::Fast`]
const MIN_COMPRESS_SIZE: usize = 1024;

/// When blob payloads are compressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionStrategy {
    /// Store every blob raw
    None,
    /// LZ4 for blobs of at least 1KB, kept only when it saves space (default)
    #[default]
    Fast,
}

/// Encodes and decodes blob payloads
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressionEngine {
    strategy: CompressionStrategy,
}

impl CompressionEngine {
    /// Create an engine with the given strategy
    pub fn new(strategy: CompressionStrategy) -> Self {
        Self { strategy }
    }

    /// Strategy in use
    pub fn strategy(&self) -> CompressionStrategy {
        self.strategy
    }

    /// Frame raw content as a stored payload
    ///
    /// Falls back to the raw frame whenever LZ4 would not shrink the data.
    pub fn compress(&self, content: &[u8]) -> Vec<u8> {
        if self.should_compress(content.len()) {
            let compressed = compress_prepend_size(content);
            if compressed.len() < content.len() {
                trace!(
                    "Compressed blob {} -> {} bytes",
                    content.len(),
                    compressed.len()
                );
                return frame(LZ4_MAGIC, &compressed);
            }
            trace!("Compression not beneficial for {} bytes, storing raw", content.len());
        }
        frame(RAW_MAGIC, content)
    }

    /// Recover raw content from a stored payload
    ///
    /// Decoding only depends on the frame header, so payloads written under
    /// any strategy can be read back by any engine.
    ///
    /// # Errors
    ///
    /// Returns [`CairnError::Decompression`] if the payload is truncated,
    /// carries an unknown header, or the LZ4 block is corrupt.
    pub fn decompress(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.len() < 4 {
            return Err(CairnError::decompression("payload too short"));
        }

        let (header, body) = payload.split_at(4);
        if header == LZ4_MAGIC {
            decompress_size_prepended(body)
                .map_err(|e| CairnError::decompression(format!("LZ4 decompression failed: {}", e)))
        } else if header == RAW_MAGIC {
            Ok(body.to_vec())
        } else {
            Err(CairnError::decompression(format!(
                "unknown payload header {:02x?}",
                header
            )))
        }
    }

    fn should_compress(&self, size: usize) -> bool {
        match self.strategy {
            CompressionStrategy::None => false,
            CompressionStrategy::Fast => size >= MIN_COMPRESS_SIZE,
        }
    }
}

fn frame(magic: &[u8; 4], body: &[u8]) -> Vec<u8> {
    let mut result = Vec::with_capacity(magic.len() + body.len());
    result.extend_from_slice(magic);
    result.extend_from_slice(body);
    result
}
