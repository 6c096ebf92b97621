use crate::adapter::RegistryAdapter;
use crate::decoder::BlobDecoder;
use crate::error::ClientError;
use appr_http::Payload;
use bytes::Bytes;
use std::fmt;

/// App registry client: an adapter and a decoder bound to one transport.
///
/// Owned by whoever created it; clients share nothing with each other
/// except the read-only proxy provider of their factory.
pub struct Client {
    adapter: Box<dyn RegistryAdapter>,
    decoder: Box<dyn BlobDecoder>,
}

impl Client {
    #[must_use]
    pub fn new(adapter: Box<dyn RegistryAdapter>, decoder: Box<dyn BlobDecoder>) -> Self {
        Self { adapter, decoder }
    }

    #[must_use]
    pub fn adapter(&self) -> &dyn RegistryAdapter {
        self.adapter.as_ref()
    }

    #[must_use]
    pub fn decoder(&self) -> &dyn BlobDecoder {
        self.decoder.as_ref()
    }

    /// # Errors
    ///
    /// Returns `ClientError::Http` on transport or status failures.
    pub async fn fetch(&self, path: &str) -> Result<Payload, ClientError> {
        self.adapter.fetch(path).await
    }

    /// Fetch a blob and decode it.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Http` on transport failures,
    /// `ClientError::UnexpectedPayload` when the registry did not answer
    /// with a byte stream and `ClientError::Decode` when decoding fails.
    pub async fn download_blob(&self, path: &str) -> Result<Bytes, ClientError> {
        let blob = self.adapter.fetch_blob(path).await?;
        Ok(self.decoder.decode(&blob)?)
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::decoder::GzipBlobDecoder;
    use crate::error::DecodeError;
    use async_trait::async_trait;

    struct Blob(&'static [u8]);

    #[async_trait]
    impl RegistryAdapter for Blob {
        async fn fetch(&self, _path: &str) -> Result<Payload, ClientError> {
            Ok(Payload::Bytes(Bytes::from_static(self.0)))
        }
    }

    struct Upper;

    impl BlobDecoder for Upper {
        fn decode(&self, blob: &[u8]) -> Result<Bytes, DecodeError> {
            Ok(Bytes::from(blob.to_ascii_uppercase()))
        }
    }

    #[tokio::test]
    async fn test_download_blob_uses_decoder() {
        let client = Client::new(Box::new(Blob(b"etcd")), Box::new(Upper));
        let decoded = client.download_blob("/blobs/etcd").await.unwrap();
        assert_eq!(decoded.as_ref(), b"ETCD");
    }

    #[tokio::test]
    async fn test_download_blob_decode_error() {
        let client = Client::new(Box::new(Blob(b"not gzip")), Box::new(GzipBlobDecoder::new()));
        let err = client.download_blob("/blobs/etcd").await.unwrap_err();
        assert!(matches!(err, ClientError::Decode(DecodeError::NotGzip)));
    }
}
