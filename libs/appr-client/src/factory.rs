use crate::adapter::ApprAdapter;
use crate::api::RegistryApi;
use crate::client::Client;
use crate::decoder::GzipBlobDecoder;
use crate::error::{ClientError, ConfigErrorKind};
use crate::options::Options;
use appr_http::{
    ApiKeyLocation, Consumer, Endpoint, EnvProxyProvider, ProxyProvider, TransportBuilder,
    TransportConfig,
};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Media type registries use for package blobs.
pub const GZIP_MEDIA_TYPE: &str = "application/x-gzip";

/// Creates registry clients.
pub trait ClientFactory: Send + Sync {
    /// Build a client for `options.source`.
    ///
    /// No network I/O happens here, but the call must be made inside a
    /// Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` when the source is not a URL
    /// with a host, or when the transport cannot be built (including when no
    /// runtime is running).
    fn new_client(&self, options: Options) -> Result<Client, ClientError>;
}

/// [`ClientFactory`] producing proxy-aware, optionally authenticated clients.
///
/// Every client built here asks the factory's [`ProxyProvider`] for a
/// decision on each request, so proxy changes made after construction
/// apply to the next request.
#[derive(Clone)]
pub struct DefaultClientFactory {
    proxy_provider: Arc<dyn ProxyProvider>,
    config: TransportConfig,
}

impl DefaultClientFactory {
    /// Factory reading proxy settings from the environment on every request.
    #[must_use]
    pub fn new() -> Self {
        Self {
            proxy_provider: Arc::new(EnvProxyProvider),
            config: TransportConfig::default(),
        }
    }

    #[must_use]
    pub fn with_proxy_provider(mut self, provider: Arc<dyn ProxyProvider>) -> Self {
        self.proxy_provider = provider;
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: TransportConfig) -> Self {
        self.config = config;
        self
    }
}

impl Default for DefaultClientFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DefaultClientFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultClientFactory")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ClientFactory for DefaultClientFactory {
    fn new_client(&self, options: Options) -> Result<Client, ClientError> {
        let endpoint = parse_source(&options.source)?;
        let authenticated = !options.auth_token.is_empty();

        let mut builder = TransportBuilder::with_config(endpoint.clone(), self.config.clone())
            .proxy_provider(Arc::clone(&self.proxy_provider))
            .consumer(GZIP_MEDIA_TYPE, Consumer::ByteStream);

        if authenticated {
            builder = builder.api_key_auth(
                "Authorization",
                ApiKeyLocation::Header,
                options.auth_token,
            );
        }

        let transport = builder.build().map_err(|e| {
            ClientError::configuration(&options.source, ConfigErrorKind::Transport, e)
        })?;

        tracing::debug!(
            host = endpoint.host(),
            base_path = endpoint.base_path(),
            scheme = endpoint.scheme(),
            authenticated,
            "registry client created"
        );

        let api = RegistryApi::new(transport);
        Ok(Client::new(
            Box::new(ApprAdapter::new(api)),
            Box::new(GzipBlobDecoder::new()),
        ))
    }
}

/// Split a registry source URL into the transport endpoint.
fn parse_source(source: &str) -> Result<Endpoint, ClientError> {
    let url = Url::parse(source)
        .map_err(|e| ClientError::configuration(source, ConfigErrorKind::ParseError, e))?;

    let Some(host) = url.host_str() else {
        return Err(ClientError::Configuration {
            url: source.to_owned(),
            kind: ConfigErrorKind::MissingHost,
            reason: "registry URL has no host".to_owned(),
            cause: None,
        });
    };

    let authority = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_owned(),
    };
    Ok(Endpoint::new(url.scheme(), authority, url.path()))
}
