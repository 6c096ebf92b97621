use crate::api::RegistryApi;
use crate::error::ClientError;
use appr_http::Payload;
use async_trait::async_trait;
use bytes::Bytes;

/// Registry operations used by [`crate::Client`].
#[async_trait]
pub trait RegistryAdapter: Send + Sync {
    /// Fetch a registry resource and return its consumed payload.
    async fn fetch(&self, path: &str) -> Result<Payload, ClientError>;

    /// Fetch a blob. The response must be consumed as a byte stream.
    async fn fetch_blob(&self, path: &str) -> Result<Bytes, ClientError> {
        match self.fetch(path).await? {
            Payload::Bytes(bytes) => Ok(bytes),
            other => Err(ClientError::UnexpectedPayload {
                expected: "bytes",
                actual: payload_kind(&other),
            }),
        }
    }
}

fn payload_kind(payload: &Payload) -> &'static str {
    match payload {
        Payload::Json(_) => "json",
        Payload::Text(_) => "text",
        Payload::Bytes(_) => "bytes",
    }
}

/// [`RegistryAdapter`] over a [`RegistryApi`].
#[derive(Debug, Clone)]
pub struct ApprAdapter {
    api: RegistryApi,
}

impl ApprAdapter {
    #[must_use]
    pub fn new(api: RegistryApi) -> Self {
        Self { api }
    }

    #[must_use]
    pub fn api(&self) -> &RegistryApi {
        &self.api
    }
}

#[async_trait]
impl RegistryAdapter for ApprAdapter {
    async fn fetch(&self, path: &str) -> Result<Payload, ClientError> {
        Ok(self.api.fetch(path, &[]).await?)
    }
}
