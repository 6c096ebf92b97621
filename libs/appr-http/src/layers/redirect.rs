//! Redirect policy for registry requests.
//!
//! Registries redirect blob downloads to storage or CDN hosts. The policy
//! follows those redirects while keeping the registry credential at home:
//!
//! - only same-origin redirects (same scheme, host, port) unless the target
//!   host is allow-listed
//! - `Authorization`, `Cookie` and `Proxy-Authorization` are removed once the
//!   chain leaves the original origin
//! - HTTPS → HTTP downgrades are refused
//! - the chain length is capped

use crate::config::RedirectConfig;
use http::{Request, Uri, header};
use tower_http::follow_redirect::policy::{Action, Attempt, Policy};

const SENSITIVE_HEADERS: &[header::HeaderName] = &[
    header::AUTHORIZATION,
    header::COOKIE,
    header::PROXY_AUTHORIZATION,
];

/// [`Policy`] implementation driven by [`RedirectConfig`].
///
/// A fresh clone is used per request, so counters start at zero each time.
#[derive(Debug, Clone)]
pub struct SecureRedirectPolicy {
    config: RedirectConfig,
    redirect_count: usize,
    cross_origin_detected: bool,
}

impl SecureRedirectPolicy {
    #[must_use]
    pub fn new(config: RedirectConfig) -> Self {
        Self {
            config,
            redirect_count: 0,
            cross_origin_detected: false,
        }
    }

    /// Scheme-less URIs count as https, so comparisons fail closed.
    fn is_same_origin(original: &Uri, target: &Uri) -> bool {
        let orig_scheme = original.scheme_str().unwrap_or("https");
        let target_scheme = target.scheme_str().unwrap_or("https");

        let orig_port = original
            .port_u16()
            .unwrap_or_else(|| default_port(orig_scheme));
        let target_port = target
            .port_u16()
            .unwrap_or_else(|| default_port(target_scheme));

        orig_scheme == target_scheme
            && original.host().unwrap_or("") == target.host().unwrap_or("")
            && orig_port == target_port
    }

    fn is_https_downgrade(original: &Uri, target: &Uri) -> bool {
        original.scheme_str().unwrap_or("https") == "https"
            && target.scheme_str().unwrap_or("https") == "http"
    }

    fn is_allowed_host(&self, target: &Uri) -> bool {
        target
            .host()
            .is_some_and(|host| self.config.allowed_redirect_hosts.contains(host))
    }
}

fn default_port(scheme: &str) -> u16 {
    match scheme {
        "http" => 80,
        "https" => 443,
        _ => 0,
    }
}

impl<B: Clone, E> Policy<B, E> for SecureRedirectPolicy {
    fn redirect(&mut self, attempt: &Attempt<'_>) -> Result<Action, E> {
        self.redirect_count += 1;
        if self.redirect_count > self.config.max_redirects {
            tracing::debug!(
                count = self.redirect_count,
                max = self.config.max_redirects,
                "redirect limit reached"
            );
            return Ok(Action::Stop);
        }

        let original = attempt.previous();
        let target = attempt.location();

        if !self.config.allow_https_downgrade && Self::is_https_downgrade(original, target) {
            tracing::warn!(%original, %target, "refusing HTTPS to HTTP redirect");
            return Ok(Action::Stop);
        }

        let same_origin = Self::is_same_origin(original, target);
        if self.config.same_origin_only && !same_origin && !self.is_allowed_host(target) {
            tracing::warn!(%original, %target, "refusing cross-origin redirect");
            return Ok(Action::Stop);
        }

        if !same_origin {
            self.cross_origin_detected = true;
            tracing::debug!(%original, %target, "following cross-origin redirect");
        }

        Ok(Action::Follow)
    }

    fn on_request(&mut self, request: &mut Request<B>) {
        if self.cross_origin_detected && self.config.strip_sensitive_headers {
            let headers = request.headers_mut();
            for name in SENSITIVE_HEADERS {
                if headers.remove(name).is_some() {
                    tracing::debug!(header = %name, "stripped credential on cross-origin redirect");
                }
            }
        }
    }

    fn clone_body(&self, body: &B) -> Option<B> {
        // 307/308 replay the original body
        Some(body.clone())
    }
}
