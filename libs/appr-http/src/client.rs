use crate::builder::TransportBuilder;
use crate::config::TransportSecurity;
use crate::consumer::ConsumerRegistry;
use crate::endpoint::Endpoint;
use crate::error::HttpError;
use crate::request::RequestBuilder;
use crate::response::ResponseBody;
use bytes::Bytes;
use http::{Method, Request, Response};
use http_body_util::Full;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tower::Service;
use tower::buffer::Buffer;

pub type ServiceFuture =
    Pin<Box<dyn Future<Output = Result<Response<ResponseBody>, HttpError>> + Send>>;

pub type BufferedService = Buffer<Request<Full<Bytes>>, ServiceFuture>;

/// Configured HTTP transport bound to one registry endpoint.
///
/// Cloning is cheap and clones share connection pools, the request buffer
/// and the consumer registry. No `Mutex` is needed to use a transport from
/// several tasks.
///
/// Build one with [`Transport::builder`].
#[derive(Clone)]
pub struct Transport {
    pub(crate) service: BufferedService,
    pub(crate) endpoint: Endpoint,
    pub(crate) consumers: Arc<ConsumerRegistry>,
    pub(crate) max_body_size: usize,
    pub(crate) transport_security: TransportSecurity,
}

impl Transport {
    #[must_use]
    pub fn builder(endpoint: Endpoint) -> TransportBuilder {
        TransportBuilder::new(endpoint)
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Media type consumers used by [`crate::HttpResponse::consume`].
    #[must_use]
    pub fn consumers(&self) -> &ConsumerRegistry {
        &self.consumers
    }

    /// GET `path` relative to the endpoint's base path.
    pub fn get(&self, path: &str) -> RequestBuilder {
        self.request(Method::GET, path)
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        RequestBuilder::new(
            self.service.clone(),
            self.max_body_size,
            self.transport_security,
            method,
            self.endpoint.url_for(path),
        )
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("endpoint", &self.endpoint)
            .field("max_body_size", &self.max_body_size)
            .field("transport_security", &self.transport_security)
            .finish_non_exhaustive()
    }
}

/// Map buffer errors to `HttpError`.
///
/// Errors from the inner stack come through as boxed `HttpError`; anything
/// else means the buffer worker is gone.
pub fn map_buffer_error(err: tower::BoxError) -> HttpError {
    match err.downcast::<HttpError>() {
        Ok(http_err) => *http_err,
        Err(err) => {
            tracing::error!(
                error = %err,
                "transport buffer worker closed unexpectedly"
            );
            HttpError::ServiceClosed
        }
    }
}

/// Poll the buffer once; a full buffer fails with `HttpError::Overloaded`
/// instead of waiting.
///
/// # Errors
///
/// Returns `HttpError::Overloaded` when the buffer is full and
/// `HttpError::ServiceClosed` when the worker has stopped.
pub async fn try_acquire_buffer_slot(service: &mut BufferedService) -> Result<(), HttpError> {
    use std::task::Poll;

    let poll_result = std::future::poll_fn(|cx| match service.poll_ready(cx) {
        Poll::Ready(result) => Poll::Ready(Some(result)),
        Poll::Pending => Poll::Ready(None),
    })
    .await;

    match poll_result {
        Some(Ok(())) => Ok(()),
        Some(Err(e)) => Err(map_buffer_error(e)),
        None => Err(HttpError::Overloaded),
    }
}
