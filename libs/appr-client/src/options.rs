use appr_http::SecretString;
use serde::Deserialize;

/// Connection options for one registry client.
///
/// An empty `auth_token` means the registry is public and no
/// `Authorization` header is sent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Options {
    /// URL of the remote app registry, e.g. `https://quay.io/cnr`
    pub source: String,

    /// Token for private repositories, sent verbatim as `Authorization`
    #[serde(default)]
    pub auth_token: SecretString,
}

impl Options {
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            auth_token: SecretString::default(),
        }
    }

    #[must_use]
    pub fn with_auth_token(mut self, token: impl Into<SecretString>) -> Self {
        self.auth_token = token.into();
        self
    }
}
