use std::collections::HashSet;
use std::time::Duration;

/// Default User-Agent string for registry requests
pub const DEFAULT_USER_AGENT: &str = concat!("appr-http/", env!("CARGO_PKG_VERSION"));

/// Concurrency limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum concurrent requests (default: 100)
    pub max_concurrent_requests: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 100,
        }
    }
}

impl RateLimitConfig {
    /// Unlimited concurrency (the limit layer is skipped entirely)
    #[must_use]
    pub fn unlimited() -> Self {
        Self {
            max_concurrent_requests: usize::MAX,
        }
    }
}

/// Configuration for redirect behavior
///
/// ## Security Features
///
/// - **Same-origin enforcement**: By default, only follows redirects to the same host
/// - **Header stripping**: Removes `Authorization`, `Cookie` on cross-origin redirects
/// - **Downgrade protection**: Blocks HTTPS → HTTP redirects
/// - **Host allow-list**: Configurable list of trusted redirect targets
///
/// Registries commonly redirect blob downloads to a CDN host; list such hosts
/// in `allowed_redirect_hosts` rather than disabling same-origin checks.
#[derive(Debug, Clone)]
pub struct RedirectConfig {
    /// Maximum number of redirects to follow (default: 10)
    ///
    /// Set to `0` to disable redirect following entirely.
    pub max_redirects: usize,

    /// Only allow same-origin redirects (default: true)
    pub same_origin_only: bool,

    /// Hosts that are allowed as redirect targets even when `same_origin_only` is true
    ///
    /// Hostnames only, without scheme or port: `"cdn.example.com"`.
    pub allowed_redirect_hosts: HashSet<String>,

    /// Strip `Authorization`, `Cookie` and `Proxy-Authorization` on
    /// cross-origin redirects (default: true)
    pub strip_sensitive_headers: bool,

    /// Allow HTTPS → HTTP downgrades (default: false)
    pub allow_https_downgrade: bool,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            max_redirects: 10,
            same_origin_only: true,
            allowed_redirect_hosts: HashSet::new(),
            strip_sensitive_headers: true,
            allow_https_downgrade: false,
        }
    }
}

impl RedirectConfig {
    /// Allow redirects to any host, still stripping credentials cross-origin.
    ///
    /// HTTPS → HTTP downgrades stay blocked.
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            same_origin_only: false,
            ..Default::default()
        }
    }

    /// Do not follow redirects
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            max_redirects: 0,
            ..Default::default()
        }
    }

    /// Configuration for tests against local mock servers (allows HTTP, permissive)
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            max_redirects: 10,
            same_origin_only: false,
            allowed_redirect_hosts: HashSet::new(),
            strip_sensitive_headers: true,
            allow_https_downgrade: true,
        }
    }
}

/// TLS root certificate configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TlsRootConfig {
    /// Use Mozilla's root certificates (webpki-roots, no OS dependency)
    #[default]
    WebPki,
    /// Use OS native root certificate store
    Native,
}

/// Transport security configuration
///
/// Controls whether the transport enforces TLS or allows insecure HTTP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[non_exhaustive]
pub enum TransportSecurity {
    /// Require TLS for all registry requests (HTTPS only)
    #[default]
    TlsOnly,
    /// Allow plain HTTP registry URLs
    ///
    /// Registries served over `http://` (on-premise mirrors, mock servers)
    /// need this; traffic and the API key travel unencrypted.
    AllowInsecureHttp,
}

/// Overall transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Per-request timeout (default: 30 seconds)
    pub request_timeout: Duration,

    /// Maximum response body size in bytes (default: 64 MB)
    ///
    /// Registry blobs are whole package archives, so the default is larger
    /// than a typical API client would use.
    pub max_body_size: usize,

    /// User-Agent header value
    pub user_agent: String,

    /// Concurrency configuration
    pub rate_limit: Option<RateLimitConfig>,

    /// Transport security mode (default: `TlsOnly`)
    pub transport: TransportSecurity,

    /// TLS root certificate strategy (default: `WebPki`)
    pub tls_roots: TlsRootConfig,

    /// Buffer capacity for concurrent request handling (default: 1024)
    pub buffer_capacity: usize,

    /// Redirect policy configuration (default: same-origin only with header stripping)
    pub redirect: RedirectConfig,

    /// Timeout for idle connections in each route pool (default: 90 seconds)
    ///
    /// Set to `None` to use hyper-util's default idle timeout.
    pub pool_idle_timeout: Option<Duration>,

    /// Maximum number of idle connections per host in each route pool (default: 32)
    pub pool_max_idle_per_host: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            max_body_size: 64 * 1024 * 1024,
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            rate_limit: Some(RateLimitConfig::default()),
            transport: TransportSecurity::TlsOnly,
            tls_roots: TlsRootConfig::default(),
            buffer_capacity: 1024,
            redirect: RedirectConfig::default(),
            pool_idle_timeout: Some(Duration::from_secs(90)),
            pool_max_idle_per_host: 32,
        }
    }
}

impl TransportConfig {
    /// Minimal configuration (no concurrency limit, small timeout and pools)
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024,
            rate_limit: None,
            buffer_capacity: 256,
            pool_idle_timeout: Some(Duration::from_secs(30)),
            pool_max_idle_per_host: 8,
            ..Default::default()
        }
    }

    /// Configuration for testing with mock servers (allows insecure HTTP)
    ///
    /// **WARNING**: never use in production.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_body_size: 1024 * 1024,
            rate_limit: None,
            transport: TransportSecurity::AllowInsecureHttp,
            buffer_capacity: 256,
            redirect: RedirectConfig::for_testing(),
            pool_idle_timeout: Some(Duration::from_secs(10)),
            pool_max_idle_per_host: 4,
            ..Default::default()
        }
    }
}
