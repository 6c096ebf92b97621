use crate::consumer::{ConsumerRegistry, Payload};
use crate::error::HttpError;
use crate::security::ERROR_BODY_PREVIEW_LIMIT;
use bytes::Bytes;
use http::{HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;

/// Boxed response body, already decompressed when the server used
/// `Content-Encoding`.
pub type ResponseBody =
    http_body_util::combinators::BoxBody<Bytes, Box<dyn std::error::Error + Send + Sync>>;

/// Registry response with body-reading helpers.
///
/// Every body read enforces the transport's `max_body_size`.
#[derive(Debug)]
pub struct HttpResponse {
    pub(crate) inner: Response<ResponseBody>,
    pub(crate) max_body_size: usize,
}

impl HttpResponse {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    /// `Content-Type` header, if present and valid UTF-8.
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.inner
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }

    /// Return `HttpError::HttpStatus` for non-2xx responses without reading the body.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::HttpStatus` if the response status is not 2xx.
    pub fn error_for_status(self) -> Result<Self, HttpError> {
        if self.inner.status().is_success() {
            return Ok(self);
        }

        Err(HttpError::HttpStatus {
            status: self.inner.status(),
            body_preview: String::new(),
            content_type: self.content_type().map(String::from),
        })
    }

    /// Read the body without a status check.
    ///
    /// # Errors
    /// Returns `HttpError::BodyTooLarge` if body exceeds limit.
    pub async fn bytes(self) -> Result<Bytes, HttpError> {
        read_body_limited(self.inner, self.max_body_size).await
    }

    /// Read the body of a 2xx response.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` (with a body preview) if status is not 2xx,
    /// `HttpError::BodyTooLarge` if body exceeds limit.
    pub async fn checked_bytes(self) -> Result<Bytes, HttpError> {
        checked_body(self.inner, self.max_body_size).await
    }

    /// # Errors
    /// Returns `HttpError::HttpStatus`, `HttpError::BodyTooLarge` or `HttpError::Json`.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T, HttpError> {
        let body = checked_body(self.inner, self.max_body_size).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// Body as text; invalid UTF-8 is replaced.
    ///
    /// # Errors
    /// Returns `HttpError::HttpStatus` or `HttpError::BodyTooLarge`.
    pub async fn text(self) -> Result<String, HttpError> {
        let body = checked_body(self.inner, self.max_body_size).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    /// Consume the body with the consumer registered for its media type.
    ///
    /// The status is checked first. A response without `Content-Type` is
    /// consumed as a byte stream.
    ///
    /// # Errors
    ///
    /// Returns `HttpError::HttpStatus` for non-2xx responses,
    /// `HttpError::UnsupportedContentType` when no consumer matches, and
    /// any error of the chosen consumer.
    pub async fn consume(self, consumers: &ConsumerRegistry) -> Result<Payload, HttpError> {
        if !self.inner.status().is_success() {
            return Err(status_error(self.inner, self.max_body_size).await);
        }

        let consumer = consumers.lookup(self.content_type())?;
        let body = read_body_limited(self.inner, self.max_body_size).await?;
        consumer.consume(body)
    }

    /// Body stream without size limit or status check.
    #[must_use]
    pub fn into_body(self) -> ResponseBody {
        self.inner.into_body()
    }

    #[must_use]
    pub fn max_body_size(&self) -> usize {
        self.max_body_size
    }
}

async fn checked_body(
    response: Response<ResponseBody>,
    max_body_size: usize,
) -> Result<Bytes, HttpError> {
    if !response.status().is_success() {
        return Err(status_error(response, max_body_size).await);
    }
    read_body_limited(response, max_body_size).await
}

/// `HttpStatus` error with a bounded body preview. Transport errors while
/// reading the preview win over the status error.
async fn status_error(response: Response<ResponseBody>, max_body_size: usize) -> HttpError {
    let status = response.status();
    let content_type = response
        .headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let preview_limit = max_body_size.min(ERROR_BODY_PREVIEW_LIMIT);
    let body_preview = match read_body_limited(response, preview_limit).await {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(HttpError::BodyTooLarge { .. }) => "<body too large for preview>".to_owned(),
        Err(e) => return e,
    };

    HttpError::HttpStatus {
        status,
        body_preview,
        content_type,
    }
}

/// Collect the body, failing once more than `limit` bytes arrive.
///
/// Runs after decompression, so the limit applies to decompressed bytes.
async fn read_body_limited(
    response: Response<ResponseBody>,
    limit: usize,
) -> Result<Bytes, HttpError> {
    let mut body = std::pin::pin!(response.into_body());
    let mut collected = Vec::new();

    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(HttpError::Transport)?;
        if let Some(chunk) = frame.data_ref() {
            if collected.len() + chunk.len() > limit {
                return Err(HttpError::BodyTooLarge {
                    limit,
                    actual: collected.len() + chunk.len(),
                });
            }
            collected.extend_from_slice(chunk);
        }
    }

    Ok(Bytes::from(collected))
}
