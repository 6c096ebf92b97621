//! `appr-fetch` - fetch one resource or blob from an app registry.
//!
//! ```bash
//! # JSON resource, proxies from HTTP_PROXY/HTTPS_PROXY/NO_PROXY
//! appr-fetch --source https://quay.io/cnr /api/v1/packages?namespace=quay
//!
//! # Private blob, decoded to a file
//! APPR_AUTH_TOKEN=... appr-fetch --source https://quay.io/cnr --decode \
//!     --output etcd.yaml /api/v1/packages/quay/etcd/blobs/sha256/abc
//!
//! # Layered config: YAML file, then APPR__* variables, then flags
//! appr-fetch --config appr.yaml -vv /api/v1/packages
//! ```

mod config;
mod output;

use anyhow::{Context, Result};
use appr_client::{ClientFactory, DefaultClientFactory, Options};
use appr_http::{
    EnvProxyProvider, Payload, ProxyProvider, SharedProxyConfig, TransportConfig,
    TransportSecurity,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::{CliOverrides, FetchConfig};
use crate::output::write_output;

/// Fetch a resource or blob from an app registry
#[derive(Parser, Debug)]
#[command(name = "appr-fetch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Registry URL (overrides config)
    #[arg(long)]
    source: Option<String>,

    /// Registry token, sent verbatim in `Authorization`
    #[arg(long, env = "APPR_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Gunzip the fetched blob
    #[arg(long)]
    decode: bool,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Registry path, relative to the source URL's path
    #[arg(value_name = "PATH")]
    path: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = FetchConfig::load(cli.config.as_deref())?;
    config.apply_cli_overrides(CliOverrides {
        source: cli.source,
        auth_token: cli.auth_token,
        decode_blobs: cli.decode,
    });

    let source = config
        .source
        .clone()
        .context("no registry source; pass --source or set `source` in the config")?;

    let client = factory(&config)
        .new_client(Options::new(source).with_auth_token(config.auth_token.clone()))?;

    if config.decode_blobs {
        let decoded = client.download_blob(&cli.path).await?;
        write_output(cli.output.as_deref(), &decoded)?;
    } else {
        let rendered = match client.fetch(&cli.path).await? {
            Payload::Json(value) => {
                let mut text = serde_json::to_vec_pretty(&value)?;
                text.push(b'\n');
                text
            }
            Payload::Text(text) => text.into_bytes(),
            Payload::Bytes(bytes) => bytes.to_vec(),
        };
        write_output(cli.output.as_deref(), &rendered)?;
    }

    tracing::info!(path = %cli.path, "fetch complete");
    Ok(())
}

fn factory(config: &FetchConfig) -> DefaultClientFactory {
    let provider: Arc<dyn ProxyProvider> = match &config.proxy {
        Some(proxy) => Arc::new(SharedProxyConfig::new(proxy.clone())),
        None => Arc::new(EnvProxyProvider),
    };

    let mut transport = TransportConfig {
        request_timeout: config.request_timeout,
        ..TransportConfig::default()
    };
    if config.insecure_http {
        tracing::warn!("insecure_http enabled; registry traffic is not encrypted");
        transport.transport = TransportSecurity::AllowInsecureHttp;
    }

    DefaultClientFactory::new()
        .with_proxy_provider(provider)
        .with_config(transport)
}

/// `RUST_LOG` wins over `-v`; logs go to stderr so stdout stays clean.
fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
