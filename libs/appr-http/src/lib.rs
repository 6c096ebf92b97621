#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Proxy-aware HTTP transport for app registry clients.
//!
//! A [`Transport`] is bound to one registry [`Endpoint`] and runs every
//! request through a tower stack with:
//! - TLS via rustls (HTTPS only unless insecure HTTP is allowed)
//! - a [`ProxyProvider`] consulted for **each** request, so proxy settings
//!   changed at runtime apply to the next request
//! - optional API key injection, sent exactly as configured
//! - per-request timeouts, concurrency limiting and fail-fast buffering
//! - transparent `Content-Encoding` decompression
//! - redirect following that strips credentials off-origin
//!
//! Responses are decoded with the [`Consumer`] registered for their media
//! type in the transport's [`ConsumerRegistry`].
//!
//! ```ignore
//! use appr_http::{Consumer, Endpoint, Transport};
//!
//! let transport = Transport::builder(Endpoint::new("https", "quay.io", "/cnr"))
//!     .consumer("application/x-gzip", Consumer::ByteStream)
//!     .build()?;
//!
//! let payload = transport
//!     .get("/api/v1/packages")
//!     .send()
//!     .await?
//!     .consume(transport.consumers())
//!     .await?;
//! ```

mod builder;
mod client;
mod config;
mod consumer;
mod endpoint;
mod error;
mod layers;
mod proxy;
mod request;
mod response;
mod secret;
pub mod security;
#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test_support;
mod tls;

pub use builder::TransportBuilder;
pub use client::Transport;
pub use config::{
    DEFAULT_USER_AGENT, RateLimitConfig, RedirectConfig, TlsRootConfig, TransportConfig,
    TransportSecurity,
};
pub use consumer::{Consumer, ConsumerRegistry, Payload};
pub use endpoint::Endpoint;
pub use error::{HttpError, InvalidUriKind};
pub use layers::{
    ApiKeyAuthLayer, ApiKeyAuthService, ApiKeyLocation, SecureRedirectPolicy, TraceLayer,
    TraceService, UserAgentLayer, UserAgentService,
};
pub use proxy::{
    EnvProxyProvider, NoProxy, ProxyConfig, ProxyConnector, ProxyProvider, ProxyRoutingService,
    ProxyStream, ProxyTarget, RouteSettings, SharedProxyConfig,
};
pub use request::RequestBuilder;
pub use response::{HttpResponse, ResponseBody};
pub use secret::SecretString;
