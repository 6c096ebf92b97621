use crate::error::HttpError;
use crate::secret::SecretString;
use http::header::HeaderName;
use http::{HeaderValue, Request, Response, Uri};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Where an API key is placed on the outgoing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyLocation {
    /// `name: value` request header
    Header,
    /// `name=value` query parameter
    Query,
}

#[derive(Clone)]
enum Injection {
    Header(HeaderName, HeaderValue),
    /// Already url-encoded `name=value` pair
    Query(SecretString),
}

/// Tower layer that attaches an API key to every request.
///
/// The key is sent exactly as supplied (no `Bearer` prefix). Header values
/// are marked sensitive so hyper and `Debug` output never show them.
#[derive(Clone)]
pub struct ApiKeyAuthLayer {
    injection: Injection,
}

impl ApiKeyAuthLayer {
    /// # Errors
    ///
    /// Returns `HttpError::InvalidHeaderName` / `InvalidHeaderValue` when the
    /// key cannot be carried in a header, or `HttpError::FormEncode` when it
    /// cannot be query-encoded.
    pub fn try_new(
        name: &str,
        location: ApiKeyLocation,
        value: &SecretString,
    ) -> Result<Self, HttpError> {
        let injection = match location {
            ApiKeyLocation::Header => {
                let name = HeaderName::from_bytes(name.as_bytes())?;
                let mut value = HeaderValue::from_str(value.expose())?;
                value.set_sensitive(true);
                Injection::Header(name, value)
            }
            ApiKeyLocation::Query => {
                let pair = serde_urlencoded::to_string([(name, value.expose())])?;
                Injection::Query(SecretString::new(pair))
            }
        };
        Ok(Self { injection })
    }
}

impl fmt::Debug for ApiKeyAuthLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let location = match &self.injection {
            Injection::Header(name, _) => format!("header {name}"),
            Injection::Query(_) => "query".to_owned(),
        };
        f.debug_struct("ApiKeyAuthLayer")
            .field("location", &location)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for ApiKeyAuthLayer {
    type Service = ApiKeyAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ApiKeyAuthService {
            inner,
            injection: self.injection.clone(),
        }
    }
}

/// Service created by [`ApiKeyAuthLayer`].
#[derive(Clone)]
pub struct ApiKeyAuthService<S> {
    inner: S,
    injection: Injection,
}

impl<S, B, ResBody> Service<Request<B>> for ApiKeyAuthService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>, Error = HttpError>
        + Clone
        + Send
        + 'static,
    S::Future: Send,
    B: Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = HttpError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResBody>, HttpError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        match &self.injection {
            Injection::Header(name, value) => {
                req.headers_mut().insert(name.clone(), value.clone());
            }
            Injection::Query(pair) => match append_query(req.uri(), pair.expose()) {
                Ok(uri) => *req.uri_mut() = uri,
                Err(e) => return Box::pin(async { Err(e) }),
            },
        }

        // Call the instance that was poll_ready'd, keep a fresh clone for next time.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move { inner.call(req).await })
    }
}

fn append_query(uri: &Uri, pair: &str) -> Result<Uri, HttpError> {
    let path_and_query = match uri.query() {
        Some(query) if !query.is_empty() => format!("{}?{query}&{pair}", uri.path()),
        _ => format!("{}?{pair}", uri.path()),
    };

    let mut parts = uri.clone().into_parts();
    parts.path_and_query = Some(path_and_query.parse().map_err(http::Error::from)?);
    Ok(Uri::from_parts(parts).map_err(http::Error::from)?)
}
