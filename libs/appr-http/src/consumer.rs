//! Response body consumers keyed by media type.

use crate::error::HttpError;
use bytes::Bytes;
use std::collections::HashMap;

/// How a response body of a given media type is turned into a [`Payload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Consumer {
    /// Parse as JSON
    Json,
    /// Decode as UTF-8 text
    Text,
    /// Hand back the raw bytes untouched
    ByteStream,
}

/// A consumed response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(serde_json::Value),
    Text(String),
    Bytes(Bytes),
}

impl Payload {
    /// Raw bytes, if this payload came from a byte-stream consumer.
    #[must_use]
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            Payload::Bytes(bytes) => Some(bytes),
            Payload::Json(_) | Payload::Text(_) => None,
        }
    }
}

impl Consumer {
    /// Apply this consumer to a fully read body.
    ///
    /// # Errors
    ///
    /// `HttpError::Json` for malformed JSON, `HttpError::InvalidText` for
    /// text that is not valid UTF-8.
    pub fn consume(self, body: Bytes) -> Result<Payload, HttpError> {
        match self {
            Consumer::Json => Ok(Payload::Json(serde_json::from_slice(&body)?)),
            Consumer::Text => Ok(Payload::Text(String::from_utf8(body.to_vec())?)),
            Consumer::ByteStream => Ok(Payload::Bytes(body)),
        }
    }
}

/// Media type → consumer table.
///
/// Lookups ignore parameters (`; charset=utf-8`) and case. A response
/// without `Content-Type` is consumed as a byte stream.
#[derive(Debug, Clone)]
pub struct ConsumerRegistry {
    consumers: HashMap<String, Consumer>,
}

impl Default for ConsumerRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("application/json", Consumer::Json);
        registry.register("text/plain", Consumer::Text);
        registry.register("application/octet-stream", Consumer::ByteStream);
        registry
    }
}

impl ConsumerRegistry {
    /// Registry with no media types at all.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            consumers: HashMap::new(),
        }
    }

    /// Register (or replace) the consumer for `media_type`.
    pub fn register(&mut self, media_type: &str, consumer: Consumer) {
        self.consumers.insert(essence(media_type), consumer);
    }

    /// Consumer for a `Content-Type` header value.
    ///
    /// # Errors
    ///
    /// `HttpError::UnsupportedContentType` when nothing is registered for the
    /// media type.
    pub fn lookup(&self, content_type: Option<&str>) -> Result<Consumer, HttpError> {
        let Some(content_type) = content_type else {
            return Ok(Consumer::ByteStream);
        };
        let media_type = essence(content_type);
        self.consumers
            .get(&media_type)
            .copied()
            .ok_or(HttpError::UnsupportedContentType(media_type))
    }

    /// Whether a consumer is registered for `media_type`.
    #[must_use]
    pub fn supports(&self, media_type: &str) -> bool {
        self.consumers.contains_key(&essence(media_type))
    }
}

fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
