//! TLS client configuration shared by every route pool of a transport.
//!
//! Native root certificates are loaded from the OS store once per process.

use crate::config::TlsRootConfig;
use crate::error::HttpError;
use hyper_rustls::ConfigBuilderExt;
use rustls_pki_types::CertificateDer;
use std::sync::{Arc, OnceLock};

/// Cached native root certificates; empty means none were found.
static NATIVE_ROOTS_CACHE: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

#[cfg(test)]
static LOAD_COUNT: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

fn load_native_certs_inner() -> Vec<CertificateDer<'static>> {
    #[cfg(test)]
    LOAD_COUNT.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

    let result = rustls_native_certs::load_native_certs();
    for err in &result.errors {
        tracing::warn!(error = %err, "error loading native root certificate");
    }

    if result.certs.is_empty() {
        tracing::warn!("no native root CA certificates found");
    } else {
        tracing::debug!(count = result.certs.len(), "loaded native root certificates");
    }

    result.certs
}

/// Cached native root certificates (may be empty).
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS_CACHE
        .get_or_init(load_native_certs_inner)
        .as_slice()
}

/// Use the globally installed crypto provider if there is one,
/// otherwise a fresh aws-lc-rs provider (without installing it).
pub fn get_crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    rustls::crypto::CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Build the rustls `ClientConfig` for the requested root store.
///
/// ALPN is left empty; the HTTPS connector fills it in.
///
/// # Errors
///
/// Returns `HttpError::Tls` if protocol versions cannot be configured, or
/// if `Native` roots are requested and none parse.
pub fn client_config(roots: TlsRootConfig) -> Result<rustls::ClientConfig, HttpError> {
    let builder = rustls::ClientConfig::builder_with_provider(get_crypto_provider())
        .with_safe_default_protocol_versions()
        .map_err(|e| HttpError::Tls(Box::new(e)))?;

    let config = match roots {
        TlsRootConfig::WebPki => builder.with_webpki_roots().with_no_client_auth(),
        TlsRootConfig::Native => builder
            .with_root_certificates(native_root_store()?)
            .with_no_client_auth(),
    };

    Ok(config)
}

fn native_root_store() -> Result<rustls::RootCertStore, HttpError> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err(HttpError::Tls(
            "no native root CA certificates found in OS certificate store".into(),
        ));
    }

    let mut root_store = rustls::RootCertStore::empty();
    let (added, ignored) = root_store.add_parsable_certificates(certs.iter().cloned());

    if ignored > 0 {
        tracing::warn!(added, ignored, "some native root certificates could not be parsed");
    }

    if added == 0 {
        return Err(HttpError::Tls(
            format!(
                "no valid native root CA certificates parsed (found {}, all {ignored} failed to parse)",
                certs.len()
            )
            .into(),
        ));
    }

    Ok(root_store)
}
