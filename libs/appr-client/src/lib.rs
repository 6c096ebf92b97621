#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! App registry client factory.
//!
//! [`DefaultClientFactory::new_client`] turns [`Options`] into a [`Client`]:
//! the source URL is split into scheme, host and base path, a proxy-aware
//! [`appr_http::Transport`] is built for it (the proxy is resolved again for
//! every request), `application/x-gzip` responses are kept as raw bytes and
//! a non-empty token is sent verbatim in `Authorization`.
//!
//! ```ignore
//! use appr_client::{ClientFactory, DefaultClientFactory, Options};
//!
//! let client = DefaultClientFactory::new()
//!     .new_client(Options::new("https://quay.io/cnr").with_auth_token(token))?;
//! let manifest = client.download_blob("/api/v1/packages/quay/etcd/blobs/sha256/abc").await?;
//! ```

mod adapter;
mod api;
mod client;
mod decoder;
mod error;
mod factory;
mod options;

pub use adapter::{ApprAdapter, RegistryAdapter};
pub use api::RegistryApi;
pub use client::Client;
pub use decoder::{BlobDecoder, DEFAULT_MAX_DECODED_SIZE, GzipBlobDecoder};
pub use error::{ClientError, ConfigErrorKind, DecodeError};
pub use factory::{ClientFactory, DefaultClientFactory, GZIP_MEDIA_TYPE};
pub use options::Options;
