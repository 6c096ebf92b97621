use http::Uri;
use std::fmt;

/// The `(scheme, host, base path)` triple a transport talks to.
///
/// `host` includes the port when one is given. `base_path` never ends with
/// `/`; an empty base path means requests are rooted at `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    scheme: String,
    host: String,
    base_path: String,
}

impl Endpoint {
    #[must_use]
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, base_path: &str) -> Self {
        let trimmed = base_path.trim_end_matches('/');
        let base_path = if trimmed.is_empty() || trimmed.starts_with('/') {
            trimmed.to_owned()
        } else {
            format!("/{trimmed}")
        };
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            host: host.into(),
            base_path,
        }
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Absolute URL for `path` under the base path.
    #[must_use]
    pub fn url_for(&self, path: &str) -> String {
        let separator = if path.starts_with('/') { "" } else { "/" };
        format!(
            "{}://{}{}{separator}{path}",
            self.scheme, self.host, self.base_path
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}{}", self.scheme, self.host, self.base_path)
    }
}

/// `scheme://authority/path` of `uri`, safe to log.
///
/// The query string is dropped since it may carry an API key.
#[must_use]
pub fn loggable_url(uri: &Uri) -> String {
    format!(
        "{}://{}{}",
        uri.scheme_str().unwrap_or("https"),
        uri.authority().map_or("", http::uri::Authority::as_str),
        uri.path()
    )
}
