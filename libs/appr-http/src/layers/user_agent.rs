use crate::error::HttpError;
use http::header::USER_AGENT;
use http::{HeaderValue, Request, Response};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Tower layer that sets `User-Agent` on requests that do not carry one.
#[derive(Clone)]
pub struct UserAgentLayer {
    user_agent: HeaderValue,
}

impl UserAgentLayer {
    /// # Errors
    /// Returns `HttpError::InvalidHeaderValue` if the string is not a valid header value
    pub fn try_new(user_agent: impl AsRef<str>) -> Result<Self, HttpError> {
        let user_agent = HeaderValue::from_str(user_agent.as_ref())?;
        Ok(Self { user_agent })
    }
}

impl<S> Layer<S> for UserAgentLayer {
    type Service = UserAgentService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        UserAgentService {
            inner,
            user_agent: self.user_agent.clone(),
        }
    }
}

#[derive(Clone)]
pub struct UserAgentService<S> {
    inner: S,
    user_agent: HeaderValue,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for UserAgentService<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        req.headers_mut()
            .entry(USER_AGENT)
            .or_insert_with(|| self.user_agent.clone());
        self.inner.call(req)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use http_body_util::Full;
    use tower::ServiceExt;

    /// Echoes the received `User-Agent` back in the response.
    #[derive(Clone)]
    struct EchoUa;

    impl Service<Request<Full<Bytes>>> for EchoUa {
        type Response = Response<Full<Bytes>>;
        type Error = HttpError;
        type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

        fn poll_ready(&mut self, _: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
            Poll::Ready(Ok(()))
        }

        fn call(&mut self, req: Request<Full<Bytes>>) -> Self::Future {
            let mut builder = Response::builder().status(StatusCode::OK);
            if let Some(ua) = req.headers().get(USER_AGENT) {
                builder = builder.header(USER_AGENT, ua);
            }
            std::future::ready(Ok(builder.body(Full::new(Bytes::new())).unwrap()))
        }
    }

    fn request() -> Request<Full<Bytes>> {
        Request::get("https://registry.example.com/")
            .body(Full::new(Bytes::new()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_user_agent_added() {
        let svc = UserAgentLayer::try_new("appr-fetch/1.0").unwrap().layer(EchoUa);
        let resp = svc.oneshot(request()).await.unwrap();
        assert_eq!(resp.headers()[USER_AGENT], "appr-fetch/1.0");
    }

    #[tokio::test]
    async fn test_user_agent_not_overwritten() {
        let svc = UserAgentLayer::try_new("appr-fetch/1.0").unwrap().layer(EchoUa);
        let mut req = request();
        req.headers_mut()
            .insert(USER_AGENT, HeaderValue::from_static("custom/2.0"));

        let resp = svc.oneshot(req).await.unwrap();
        assert_eq!(resp.headers()[USER_AGENT], "custom/2.0");
    }

    #[test]
    fn test_user_agent_layer_invalid_value() {
        assert!(UserAgentLayer::try_new("invalid\x00agent").is_err());
    }
}
