use super::{ProxyConnector, ProxyProvider, ProxyTarget};
use crate::endpoint::loggable_url;
use crate::error::HttpError;
use bytes::Bytes;
use dashmap::DashMap;
use http::header::PROXY_AUTHORIZATION;
use http::uri::Scheme;
use http::{Request, Response};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::Service;

type RouteClient = Client<HttpsConnector<ProxyConnector>, Full<Bytes>>;

/// Route pools kept per transport; the least recently used one is dropped
/// beyond this.
const MAX_ROUTES: usize = 8;

struct Route {
    client: RouteClient,
    last_used: AtomicU64,
}

/// Connection pool settings shared by every route of one transport.
#[derive(Clone)]
pub struct RouteSettings {
    pub tls: rustls::ClientConfig,
    pub allow_http: bool,
    pub pool_idle_timeout: Option<Duration>,
    pub pool_max_idle_per_host: usize,
}

impl RouteSettings {
    fn build_client(&self, route: Option<ProxyTarget>) -> RouteClient {
        let builder = HttpsConnectorBuilder::new().with_tls_config(self.tls.clone());
        let builder = if self.allow_http {
            builder.https_or_http()
        } else {
            builder.https_only()
        };
        let https = builder
            .enable_all_versions()
            .wrap_connector(ProxyConnector::new(route));

        // pool_timer is required for pool_idle_timeout to take effect
        let mut client_builder = Client::builder(TokioExecutor::new());
        client_builder
            .pool_timer(TokioTimer::new())
            .pool_max_idle_per_host(self.pool_max_idle_per_host)
            .http2_only(false);
        if let Some(idle_timeout) = self.pool_idle_timeout {
            client_builder.pool_idle_timeout(idle_timeout);
        }

        client_builder.build(https)
    }
}

/// Innermost service of a transport: picks the route for each request.
///
/// The provider is consulted on every call; the decision is never stored.
/// What is kept is one hyper connection pool per distinct route, created
/// the first time the route is used. At most `MAX_ROUTES` pools are kept;
/// in-flight requests on an evicted pool still complete.
#[derive(Clone)]
pub struct ProxyRoutingService {
    provider: Arc<dyn ProxyProvider>,
    settings: Arc<RouteSettings>,
    routes: Arc<DashMap<Option<ProxyTarget>, Route>>,
    clock: Arc<AtomicU64>,
}

impl ProxyRoutingService {
    #[must_use]
    pub fn new(provider: Arc<dyn ProxyProvider>, settings: RouteSettings) -> Self {
        Self {
            provider,
            settings: Arc::new(settings),
            routes: Arc::new(DashMap::new()),
            clock: Arc::new(AtomicU64::new(0)),
        }
    }

    fn client_for(&self, route: Option<ProxyTarget>) -> RouteClient {
        let now = self.clock.fetch_add(1, Ordering::Relaxed);
        if let Some(entry) = self.routes.get(&route) {
            entry.last_used.store(now, Ordering::Relaxed);
            return entry.client.clone();
        }

        let client = self
            .routes
            .entry(route.clone())
            .or_insert_with(|| Route {
                client: self.settings.build_client(route.clone()),
                last_used: AtomicU64::new(now),
            })
            .client
            .clone();
        self.evict_idle_routes(route.as_ref());
        client
    }

    /// Drop least recently used pools until at most `MAX_ROUTES` remain.
    fn evict_idle_routes(&self, keep: Option<&ProxyTarget>) {
        while self.routes.len() > MAX_ROUTES {
            let oldest = self
                .routes
                .iter()
                .filter(|entry| entry.key().as_ref() != keep)
                .min_by_key(|entry| entry.last_used.load(Ordering::Relaxed))
                .map(|entry| entry.key().clone());
            let Some(oldest) = oldest else {
                break;
            };
            self.routes.remove(&oldest);
            tracing::debug!(route = ?oldest, "evicted least recently used proxy route");
        }
    }

    /// Number of route pools currently kept.
    #[must_use]
    pub fn route_count(&self) -> usize {
        self.routes.len()
    }
}

impl fmt::Debug for ProxyRoutingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRoutingService")
            .field("routes", &self.routes.len())
            .finish_non_exhaustive()
    }
}

impl Service<Request<Full<Bytes>>> for ProxyRoutingService {
    type Response = Response<Incoming>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut req: Request<Full<Bytes>>) -> Self::Future {
        let route = self.provider.proxy_for(req.uri());

        if let Some(proxy) = &route {
            if proxy.uri().scheme() != Some(&Scheme::HTTP) {
                let err = HttpError::Proxy {
                    proxy: proxy.uri().to_string(),
                    reason: "only http:// proxies are supported".to_owned(),
                };
                return Box::pin(async move { Err(err) });
            }

            // https targets authenticate on the CONNECT request instead
            if req.uri().scheme() == Some(&Scheme::HTTP)
                && let Some(auth) = proxy.basic_auth()
            {
                req.headers_mut().insert(PROXY_AUTHORIZATION, auth.clone());
            }
        }

        let url = loggable_url(req.uri());
        match &route {
            Some(proxy) => tracing::debug!(
                url = %url,
                proxy = %proxy.uri(),
                proxy_auth = proxy.basic_auth().is_some(),
                "routing request through proxy"
            ),
            None => tracing::debug!(url = %url, "routing request directly"),
        }

        let client = self.client_for(route);
        Box::pin(async move { client.request(req).await.map_err(HttpError::from) })
    }
}
