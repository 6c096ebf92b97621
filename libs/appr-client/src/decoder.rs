use crate::error::DecodeError;
use bytes::Bytes;
use flate2::read::GzDecoder;
use std::io::Read;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Default decompressed-size ceiling for a single blob (256 MiB).
pub const DEFAULT_MAX_DECODED_SIZE: usize = 256 * 1024 * 1024;

/// Turns a downloaded blob into its decoded bytes.
pub trait BlobDecoder: Send + Sync {
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the blob cannot be decoded.
    fn decode(&self, blob: &[u8]) -> Result<Bytes, DecodeError>;
}

/// Gunzips `application/x-gzip` blobs.
#[derive(Debug, Clone)]
pub struct GzipBlobDecoder {
    max_decoded_size: usize,
}

impl GzipBlobDecoder {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_decoded_size(DEFAULT_MAX_DECODED_SIZE)
    }

    #[must_use]
    pub fn with_max_decoded_size(max_decoded_size: usize) -> Self {
        Self { max_decoded_size }
    }

    #[must_use]
    pub fn max_decoded_size(&self) -> usize {
        self.max_decoded_size
    }
}

impl Default for GzipBlobDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobDecoder for GzipBlobDecoder {
    fn decode(&self, blob: &[u8]) -> Result<Bytes, DecodeError> {
        if !blob.starts_with(&GZIP_MAGIC) {
            return Err(DecodeError::NotGzip);
        }

        // Read one byte past the limit to detect overflow without
        // inflating the whole stream.
        let limit = u64::try_from(self.max_decoded_size)
            .unwrap_or(u64::MAX)
            .saturating_add(1);
        let mut decoded = Vec::new();
        GzDecoder::new(blob).take(limit).read_to_end(&mut decoded)?;

        if decoded.len() > self.max_decoded_size {
            return Err(DecodeError::TooLarge {
                limit: self.max_decoded_size,
            });
        }

        tracing::trace!(
            compressed = blob.len(),
            decoded = decoded.len(),
            "blob decoded"
        );
        Ok(Bytes::from(decoded))
    }
}
