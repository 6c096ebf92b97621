use super::ProxyTarget;
use http::Uri;
use http::uri::Scheme;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::proxy::Tunnel;
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use hyper_util::rt::TokioIo;
use pin_project_lite::pin_project;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::net::TcpStream;
use tower::{BoxError, Service, ServiceExt};

type ConnectFuture = Pin<Box<dyn Future<Output = Result<ProxyStream, BoxError>> + Send>>;

/// TCP connector for one route: direct, or through a single HTTP proxy.
///
/// - direct: connect to the target
/// - `https://` target via proxy: `CONNECT` tunnel, TLS runs on top
/// - `http://` target via proxy: connect to the proxy and mark the
///   connection as proxied so requests go out in absolute-form
#[derive(Clone)]
pub struct ProxyConnector {
    http: HttpConnector,
    proxy: Option<ProxyTarget>,
}

impl ProxyConnector {
    #[must_use]
    pub fn new(proxy: Option<ProxyTarget>) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        Self { http, proxy }
    }
}

impl Service<Uri> for ProxyConnector {
    type Response = ProxyStream;
    type Error = BoxError;
    type Future = ConnectFuture;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.http.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let http = self.http.clone();

        match self.proxy.clone() {
            None => Box::pin(async move {
                let io = http.oneshot(dst).await?;
                Ok(ProxyStream::new(io, false))
            }),
            Some(proxy) if dst.scheme() == Some(&Scheme::HTTPS) => {
                let mut tunnel = Tunnel::new(proxy.uri().clone(), http);
                if let Some(auth) = proxy.basic_auth() {
                    tunnel = tunnel.with_auth(auth.clone());
                }
                Box::pin(async move {
                    let io = tunnel.oneshot(dst).await?;
                    Ok(ProxyStream::new(io, false))
                })
            }
            Some(proxy) => Box::pin(async move {
                let io = http.oneshot(proxy.uri().clone()).await?;
                Ok(ProxyStream::new(io, true))
            }),
        }
    }
}

pin_project! {
    /// TCP stream that remembers whether it talks to a forwarding proxy.
    pub struct ProxyStream {
        #[pin]
        inner: TokioIo<TcpStream>,
        forwarded: bool,
    }
}

impl ProxyStream {
    fn new(inner: TokioIo<TcpStream>, forwarded: bool) -> Self {
        Self { inner, forwarded }
    }
}

impl Connection for ProxyStream {
    fn connected(&self) -> Connected {
        let connected = self.inner.connected();
        if self.forwarded {
            connected.proxy(true)
        } else {
            connected
        }
    }
}

impl Read for ProxyStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().inner.poll_read(cx, buf)
    }
}

impl Write for ProxyStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().inner.poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        self.project().inner.poll_write_vectored(cx, bufs)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn listener() -> (TcpListener, Uri) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, format!("http://{addr}/").parse().unwrap())
    }

    #[tokio::test]
    async fn test_direct_connection_is_not_proxied() {
        let (listener, addr) = listener().await;
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let stream = ProxyConnector::new(None).oneshot(addr).await.unwrap();
        accept.await.unwrap();

        assert!(!stream.connected().is_proxied());
    }

    #[tokio::test]
    async fn test_http_target_connects_to_proxy() {
        let (listener, proxy_uri) = listener().await;
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let connector = ProxyConnector::new(Some(ProxyTarget::new(proxy_uri)));
        let target: Uri = "http://registry.invalid/api".parse().unwrap();
        let stream = connector.oneshot(target).await.unwrap();
        accept.await.unwrap();

        assert!(stream.connected().is_proxied());
    }

    #[tokio::test]
    async fn test_https_target_sends_connect_with_credentials() {
        let (listener, proxy_uri) = listener().await;
        let proxy = ProxyTarget::new(proxy_uri)
            .with_basic_auth("alice", "s3cret")
            .unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0_u8; 1024];
            let n = socket.read(&mut buf).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 200 Connection established\r\n\r\n")
                .await
                .unwrap();
            String::from_utf8_lossy(&buf[..n]).into_owned()
        });

        let target: Uri = "https://registry.invalid:443/api".parse().unwrap();
        let stream = ProxyConnector::new(Some(proxy)).oneshot(target).await.unwrap();
        let request = server.await.unwrap();

        assert!(request.starts_with("CONNECT registry.invalid:443 HTTP/1.1\r\n"));
        assert!(request.contains("Basic YWxpY2U6czNjcmV0"));
        assert!(!stream.connected().is_proxied());
    }
}
