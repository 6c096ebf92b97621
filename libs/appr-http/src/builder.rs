use crate::client::{BufferedService, Transport};
use crate::config::{RedirectConfig, TransportConfig, TransportSecurity};
use crate::consumer::{Consumer, ConsumerRegistry};
use crate::endpoint::Endpoint;
use crate::error::HttpError;
use crate::layers::{
    ApiKeyAuthLayer, ApiKeyLocation, SecureRedirectPolicy, TraceLayer, UserAgentLayer,
};
use crate::proxy::{EnvProxyProvider, ProxyProvider, ProxyRoutingService, RouteSettings};
use crate::response::ResponseBody;
use crate::secret::SecretString;
use bytes::Bytes;
use http::Response;
use http_body_util::BodyExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tower::buffer::Buffer;
use tower::limit::ConcurrencyLimitLayer;
use tower::load_shed::LoadShedLayer;
use tower::timeout::TimeoutLayer;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::decompression::DecompressionLayer;
use tower_http::follow_redirect::FollowRedirectLayer;

struct ApiKeySettings {
    name: String,
    location: ApiKeyLocation,
    value: SecretString,
}

/// Builder for [`Transport`].
///
/// Defaults: [`TransportConfig::default`], proxies from the process
/// environment, JSON/text/octet-stream consumers and no API key.
pub struct TransportBuilder {
    endpoint: Endpoint,
    config: TransportConfig,
    consumers: ConsumerRegistry,
    proxy_provider: Arc<dyn ProxyProvider>,
    api_key: Option<ApiKeySettings>,
}

impl TransportBuilder {
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_config(endpoint, TransportConfig::default())
    }

    #[must_use]
    pub fn with_config(endpoint: Endpoint, config: TransportConfig) -> Self {
        Self {
            endpoint,
            config,
            consumers: ConsumerRegistry::default(),
            proxy_provider: Arc::new(EnvProxyProvider),
            api_key: None,
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.config.max_body_size = size;
        self
    }

    #[must_use]
    pub fn transport(mut self, transport: TransportSecurity) -> Self {
        self.config.transport = transport;
        self
    }

    /// Accept `http://` endpoints.
    ///
    /// Only available in debug builds or with the `allow-insecure-http`
    /// feature; release builds use [`TransportBuilder::transport`].
    #[must_use]
    #[cfg(any(debug_assertions, feature = "allow-insecure-http"))]
    pub fn allow_insecure_http(mut self) -> Self {
        tracing::warn!(
            target: "appr_http::security",
            "allow_insecure_http() called - registry traffic will NOT be encrypted"
        );
        self.config.transport = TransportSecurity::AllowInsecureHttp;
        self
    }

    #[must_use]
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    #[must_use]
    pub fn redirect(mut self, redirect: RedirectConfig) -> Self {
        self.config.redirect = redirect;
        self
    }

    #[must_use]
    pub fn pool_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.pool_idle_timeout = timeout;
        self
    }

    #[must_use]
    pub fn pool_max_idle_per_host(mut self, max: usize) -> Self {
        self.config.pool_max_idle_per_host = max;
        self
    }

    /// Proxy decision source, consulted once per outgoing request.
    #[must_use]
    pub fn proxy_provider(mut self, provider: Arc<dyn ProxyProvider>) -> Self {
        self.proxy_provider = provider;
        self
    }

    /// Register (or replace) the consumer for a media type.
    #[must_use]
    pub fn consumer(mut self, media_type: &str, consumer: Consumer) -> Self {
        self.consumers.register(media_type, consumer);
        self
    }

    /// Attach `value` to every request under `name`, exactly as given.
    ///
    /// An unusable name or value surfaces from [`build`](Self::build).
    #[must_use]
    pub fn api_key_auth(
        mut self,
        name: impl Into<String>,
        location: ApiKeyLocation,
        value: SecretString,
    ) -> Self {
        self.api_key = Some(ApiKeySettings {
            name: name.into(),
            location,
            value,
        });
        self
    }

    /// Assemble the tower stack.
    ///
    /// Request flow (outer to inner):
    ///
    /// ```text
    /// Buffer -> Trace -> LoadShed/ConcurrencyLimit -> [ApiKeyAuth] ->
    /// ErrorMapping -> Timeout -> UserAgent -> Decompression ->
    /// FollowRedirect -> ProxyRouting -> per-route hyper client
    /// ```
    ///
    /// The API key is added outside `FollowRedirect` so the redirect policy
    /// can strip it when a redirect leaves the registry origin.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::Tls` when the root store cannot be built,
    /// `HttpError::InvalidHeaderValue` for an unusable user agent and the
    /// [`ApiKeyAuthLayer::try_new`] errors for an unusable API key.
    /// Returns `HttpError::NoRuntime` when called outside a Tokio runtime.
    pub fn build(self) -> Result<Transport, HttpError> {
        if self.config.transport == TransportSecurity::AllowInsecureHttp {
            tracing::warn!(
                endpoint = %self.endpoint,
                "insecure HTTP enabled (TransportSecurity::AllowInsecureHttp)"
            );
        }

        let timeout = self.config.request_timeout;

        let settings = RouteSettings {
            tls: crate::tls::client_config(self.config.tls_roots)?,
            allow_http: self.config.transport == TransportSecurity::AllowInsecureHttp,
            pool_idle_timeout: self.config.pool_idle_timeout,
            pool_max_idle_per_host: self.config.pool_max_idle_per_host,
        };
        let routing = ProxyRoutingService::new(self.proxy_provider, settings);

        let ua_layer = UserAgentLayer::try_new(&self.config.user_agent)?;
        let auth_layer = self
            .api_key
            .map(|key| ApiKeyAuthLayer::try_new(&key.name, key.location, &key.value))
            .transpose()?;
        let authenticated = auth_layer.is_some();

        let redirect_policy = SecureRedirectPolicy::new(self.config.redirect.clone());
        let service = ServiceBuilder::new()
            .layer(TimeoutLayer::new(timeout))
            .layer(ua_layer)
            .layer(DecompressionLayer::new())
            .layer(FollowRedirectLayer::with_policy(redirect_policy))
            .service(routing)
            .map_response(map_decompression_response)
            .map_err(move |e: tower::BoxError| map_tower_error(e, timeout));

        let mut boxed_service = service.boxed_clone();

        if let Some(auth_layer) = auth_layer {
            boxed_service = ServiceBuilder::new()
                .layer(auth_layer)
                .service(boxed_service)
                .boxed_clone();
        }

        if let Some(rate_limit) = self.config.rate_limit
            && rate_limit.max_concurrent_requests < usize::MAX
        {
            boxed_service = ServiceBuilder::new()
                .layer(LoadShedLayer::new())
                .layer(ConcurrencyLimitLayer::new(
                    rate_limit.max_concurrent_requests,
                ))
                .service(boxed_service)
                .map_err(map_load_shed_error)
                .boxed_clone();
        }

        boxed_service = ServiceBuilder::new()
            .layer(TraceLayer::new())
            .service(boxed_service)
            .boxed_clone();

        // Buffer spawns its worker onto the current runtime.
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(HttpError::NoRuntime);
        }

        let buffer_capacity = self.config.buffer_capacity.max(1);
        let service: BufferedService = Buffer::new(boxed_service, buffer_capacity);

        tracing::debug!(
            endpoint = %self.endpoint,
            timeout = ?timeout,
            authenticated,
            "transport built"
        );

        Ok(Transport {
            service,
            endpoint: self.endpoint,
            consumers: Arc::new(self.consumers),
            max_body_size: self.config.max_body_size,
            transport_security: self.config.transport,
        })
    }
}

impl fmt::Debug for TransportBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportBuilder")
            .field("endpoint", &self.endpoint)
            .field("config", &self.config)
            .field("consumers", &self.consumers)
            .field("api_key", &self.api_key.as_ref().map(|k| &k.name))
            .finish_non_exhaustive()
    }
}

fn map_tower_error(err: tower::BoxError, timeout: Duration) -> HttpError {
    if err.is::<tower::timeout::error::Elapsed>() {
        return HttpError::Timeout(timeout);
    }

    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(other) => HttpError::Transport(other),
    }
}

fn map_load_shed_error(err: tower::BoxError) -> HttpError {
    if err.is::<tower::load_shed::error::Overloaded>() {
        return HttpError::Overloaded;
    }

    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => HttpError::Transport(err),
    }
}

fn map_decompression_response<B>(response: Response<B>) -> Response<ResponseBody>
where
    B: hyper::body::Body<Data = Bytes> + Send + Sync + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let (parts, body) = response.into_parts();
    let body: ResponseBody = body.map_err(Into::into).boxed();
    Response::from_parts(parts, body)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::config::TlsRootConfig;
    use crate::proxy::NoProxy;
    use httpmock::prelude::*;
    use std::io::Write;

    fn endpoint() -> Endpoint {
        Endpoint::new("https", "registry.example.com", "/api")
    }

    #[test]
    fn test_builder_defaults() {
        let builder = TransportBuilder::new(endpoint());
        assert_eq!(builder.config.request_timeout, Duration::from_secs(30));
        assert_eq!(builder.config.transport, TransportSecurity::TlsOnly);
        assert!(builder.api_key.is_none());
        assert!(builder.consumers.supports("application/json"));
        assert!(!builder.consumers.supports("application/x-gzip"));
    }

    #[test]
    fn test_builder_setters() {
        let builder = TransportBuilder::new(endpoint())
            .timeout(Duration::from_secs(5))
            .user_agent("appr-fetch/0.1")
            .max_body_size(4096)
            .buffer_capacity(8)
            .pool_idle_timeout(None)
            .pool_max_idle_per_host(2)
            .redirect(RedirectConfig::disabled());

        assert_eq!(builder.config.request_timeout, Duration::from_secs(5));
        assert_eq!(builder.config.user_agent, "appr-fetch/0.1");
        assert_eq!(builder.config.max_body_size, 4096);
        assert_eq!(builder.config.buffer_capacity, 8);
        assert_eq!(builder.config.pool_idle_timeout, None);
        assert_eq!(builder.config.pool_max_idle_per_host, 2);
        assert_eq!(builder.config.redirect.max_redirects, 0);
    }

    #[test]
    fn test_allow_insecure_http() {
        let builder = TransportBuilder::new(endpoint()).allow_insecure_http();
        assert_eq!(
            builder.config.transport,
            TransportSecurity::AllowInsecureHttp
        );
    }

    #[test]
    fn test_debug_hides_api_key() {
        let builder = TransportBuilder::new(endpoint()).api_key_auth(
            "Authorization",
            ApiKeyLocation::Header,
            SecretString::new("tok123"),
        );
        let debug = format!("{builder:?}");
        assert!(debug.contains("Authorization"));
        assert!(!debug.contains("tok123"));
    }

    #[tokio::test]
    async fn test_build_with_defaults() {
        let transport = TransportBuilder::new(endpoint())
            .proxy_provider(Arc::new(NoProxy))
            .build()
            .unwrap();
        assert_eq!(transport.endpoint(), &endpoint());
    }

    #[test]
    fn test_build_outside_runtime_fails() {
        let err = TransportBuilder::new(endpoint())
            .proxy_provider(Arc::new(NoProxy))
            .build()
            .unwrap_err();
        assert!(matches!(err, HttpError::NoRuntime), "got {err:?}");
    }

    #[tokio::test]
    async fn test_build_with_native_roots() {
        let mut config = TransportConfig::default();
        config.tls_roots = TlsRootConfig::Native;
        let result = TransportBuilder::with_config(endpoint(), config).build();
        // CI images without a system trust store legitimately fail here.
        if let Err(err) = result {
            assert!(matches!(err, HttpError::Tls(_)));
        }
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_user_agent() {
        let err = TransportBuilder::new(endpoint())
            .user_agent("bad\nagent")
            .build()
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidHeaderValue(_)));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_api_key() {
        let err = TransportBuilder::new(endpoint())
            .api_key_auth(
                "Authorization",
                ApiKeyLocation::Header,
                SecretString::new("tok\n123"),
            )
            .build()
            .unwrap_err();
        assert!(matches!(err, HttpError::InvalidHeaderValue(_)));
    }

    #[tokio::test]
    async fn test_zero_buffer_capacity_clamped() {
        let transport = TransportBuilder::new(endpoint())
            .buffer_capacity(0)
            .proxy_provider(Arc::new(NoProxy))
            .build();
        assert!(transport.is_ok());
    }

    #[tokio::test]
    async fn test_timeout_maps_to_timeout_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/slow");
            then.status(200).delay(Duration::from_millis(500));
        });

        let transport = TransportBuilder::with_config(
            Endpoint::new("http", server.address().to_string(), "/api"),
            TransportConfig::for_testing(),
        )
        .timeout(Duration::from_millis(50))
        .proxy_provider(Arc::new(NoProxy))
        .build()
        .unwrap();

        let err = transport.get("/v1/slow").send().await.unwrap_err();
        assert!(matches!(err, HttpError::Timeout(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn test_gzip_content_encoding_decompressed() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(br#"{"name":"quay/etcd"}"#).unwrap();
        let compressed = encoder.finish().unwrap();

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/v1/packages/quay/etcd");
            then.status(200)
                .header("content-type", "application/json")
                .header("content-encoding", "gzip")
                .body(compressed);
        });

        let transport = TransportBuilder::with_config(
            Endpoint::new("http", server.address().to_string(), "/api"),
            TransportConfig::for_testing(),
        )
        .proxy_provider(Arc::new(NoProxy))
        .build()
        .unwrap();

        let value: serde_json::Value = transport
            .get("/v1/packages/quay/etcd")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(value["name"], "quay/etcd");
    }

    #[test]
    fn test_map_tower_error_preserves_http_error() {
        let boxed: tower::BoxError = Box::new(HttpError::ServiceClosed);
        assert!(matches!(
            map_tower_error(boxed, Duration::from_secs(1)),
            HttpError::ServiceClosed
        ));

        let other: tower::BoxError = "connection reset".into();
        assert!(matches!(
            map_tower_error(other, Duration::from_secs(1)),
            HttpError::Transport(_)
        ));
    }

    #[test]
    fn test_map_load_shed_error() {
        let overloaded: tower::BoxError = Box::new(tower::load_shed::error::Overloaded::new());
        assert!(matches!(
            map_load_shed_error(overloaded),
            HttpError::Overloaded
        ));
    }
}
