use appr_http::{HttpError, Payload, Transport};

/// Raw registry API client over a configured [`Transport`].
///
/// Paths are resolved against the transport's base path. Response bodies
/// are decoded by the consumer registered for their media type.
#[derive(Debug, Clone)]
pub struct RegistryApi {
    transport: Transport,
}

impl RegistryApi {
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    #[must_use]
    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// GET `path` with `query` parameters and consume the response.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::HttpStatus` for non-2xx responses,
    /// `HttpError::UnsupportedContentType` when no consumer is registered
    /// for the response media type, and any transport error.
    pub async fn fetch(&self, path: &str, query: &[(&str, &str)]) -> Result<Payload, HttpError> {
        self.transport
            .get(path)
            .query(query)
            .send()
            .await?
            .consume(self.transport.consumers())
            .await
    }
}
