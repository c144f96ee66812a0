use flate2::write::GzDecoder;
use sha2::{Digest, Sha256};
use std::io::Write;

use super::DecodeError;

/// Incremental gzip inflater fed one network chunk at a time.
pub struct GzipSink {
    decoder: GzDecoder<Vec<u8>>,
    compressed: usize,
    digest: Sha256,
}

#[derive(Debug)]
pub struct Inflated {
    pub bytes: Vec<u8>,
    pub compressed_len: usize,
    /// Hex sha256 of the compressed body
    pub sha256: String,
}

impl Default for GzipSink {
    fn default() -> Self {
        Self::new()
    }
}

impl GzipSink {
    pub fn new() -> Self {
        Self {
            decoder: GzDecoder::new(Vec::new()),
            compressed: 0,
            digest: Sha256::new(),
        }
    }

    pub fn compressed_len(&self) -> usize {
        self.compressed
    }

    pub fn push(&mut self, chunk: &[u8]) -> Result<(), DecodeError> {
        self.digest.update(chunk);
        self.compressed += chunk.len();
        self.decoder
            .write_all(chunk)
            .map_err(|e| DecodeError::Decompress(e.to_string()))
    }

    pub fn finish(self) -> Result<Inflated, DecodeError> {
        let bytes = self
            .decoder
            .finish()
            .map_err(|e| DecodeError::Decompress(e.to_string()))?;
        Ok(Inflated {
            bytes,
            compressed_len: self.compressed,
            sha256: hex::encode(self.digest.finalize()),
        })
    }
}
