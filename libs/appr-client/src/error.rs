use appr_http::HttpError;
use thiserror::Error;

/// What made a client configuration unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    /// `source` is not a URL
    ParseError,
    /// `source` parsed but names no host
    MissingHost,
    /// The transport could not be built from a valid source
    Transport,
}

/// Errors returned by the registry client and its factory.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    #[error("invalid registry configuration for '{url}': {reason}")]
    Configuration {
        url: String,
        kind: ConfigErrorKind,
        reason: String,
        #[source]
        cause: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("unexpected {actual} payload, expected {expected}")]
    UnexpectedPayload {
        expected: &'static str,
        actual: &'static str,
    },
}

impl ClientError {
    pub(crate) fn configuration(
        url: &str,
        kind: ConfigErrorKind,
        cause: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Configuration {
            url: url.to_owned(),
            kind,
            reason: cause.to_string(),
            cause: Some(Box::new(cause)),
        }
    }

    /// Configuration error kind, if this is a configuration error.
    #[must_use]
    pub fn config_kind(&self) -> Option<ConfigErrorKind> {
        match self {
            Self::Configuration { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Blob decoding failures.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("blob is not gzip-compressed")]
    NotGzip,

    #[error("decompressed blob exceeds {limit} bytes")]
    TooLarge { limit: usize },

    #[error("blob decompression failed: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_configuration_error_keeps_cause() {
        let cause = url::Url::parse("not a url").unwrap_err();
        let err = ClientError::configuration("not a url", ConfigErrorKind::ParseError, cause);

        assert_eq!(err.config_kind(), Some(ConfigErrorKind::ParseError));
        assert!(err.to_string().contains("not a url"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_http_error_is_transparent() {
        let err = ClientError::from(HttpError::Overloaded);
        assert_eq!(err.to_string(), HttpError::Overloaded.to_string());
        assert_eq!(err.config_kind(), None);
    }

    #[test]
    fn test_decode_error_renders() {
        assert_eq!(
            DecodeError::TooLarge { limit: 10 }.to_string(),
            "decompressed blob exceeds 10 bytes"
        );
        assert_eq!(
            ClientError::from(DecodeError::NotGzip).to_string(),
            "blob is not gzip-compressed"
        );
    }
}
