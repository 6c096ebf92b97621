use crate::endpoint::loggable_url;
use http::{Request, Response};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::{Instrument, Level};

/// Tower layer that wraps each registry request in an `outgoing_http` span.
///
/// Span fields: `http.method`, `http.url` (query string removed),
/// `http.status_code` and `error` once the response arrives.
#[derive(Clone, Default)]
pub struct TraceLayer;

impl TraceLayer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceService { inner }
    }
}

/// Service created by [`TraceLayer`].
#[derive(Clone)]
pub struct TraceService<S> {
    inner: S,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TraceService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: std::fmt::Display + Send + 'static,
    ReqBody: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<ReqBody>) -> Self::Future {
        let url = loggable_url(req.uri());

        let span = tracing::span!(
            Level::INFO, "outgoing_http",
            http.method = %req.method(),
            http.url = %url,
            http.status_code = tracing::field::Empty,
            error = tracing::field::Empty,
        );

        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let result = inner.call(req).instrument(span.clone()).await;

            match &result {
                Ok(response) => {
                    span.record("http.status_code", response.status().as_u16());
                    if response.status().is_client_error() || response.status().is_server_error()
                    {
                        span.record("error", true);
                    }
                }
                Err(err) => {
                    span.record("error", true);
                    tracing::debug!(parent: &span, error = %err, "registry request failed");
                }
            }

            result
        })
    }
}
