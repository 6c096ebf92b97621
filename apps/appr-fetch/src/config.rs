use anyhow::{Context, Result};
use appr_http::{ProxyConfig, SecretString};
use figment::Figment;
use figment::providers::{Env, Format, Yaml};
use serde::{Deserialize, Deserializer};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix; nested keys use `__` (`APPR__PROXY__HTTP_PROXY`).
pub const ENV_PREFIX: &str = "APPR__";

/// Effective `appr-fetch` configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Registry URL
    pub source: Option<String>,

    pub auth_token: SecretString,

    /// Per-request timeout, humantime syntax (`30s`, `2m`)
    #[serde(deserialize_with = "deserialize_duration")]
    pub request_timeout: Duration,

    /// Accept `http://` registries and proxies
    pub insecure_http: bool,

    /// Gunzip the fetched resource before writing it
    pub decode_blobs: bool,

    /// Static proxy settings; when absent the process environment is read
    /// on every request
    pub proxy: Option<ProxyConfig>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            source: None,
            auth_token: SecretString::default(),
            request_timeout: Duration::from_secs(30),
            insecure_http: false,
            decode_blobs: false,
            proxy: None,
        }
    }
}

/// Values given on the command line; `Some`/`true` wins over every other layer.
#[derive(Debug, Default)]
pub struct CliOverrides {
    pub source: Option<String>,
    pub auth_token: Option<String>,
    pub decode_blobs: bool,
}

impl FetchConfig {
    /// Defaults, then the YAML file (if any), then `APPR__*` variables.
    ///
    /// # Errors
    ///
    /// Fails when the file is missing or either layer does not deserialize.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();
        if let Some(path) = path {
            anyhow::ensure!(
                path.is_file(),
                "config file does not exist: {}",
                path.display()
            );
            figment = figment.merge(Yaml::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment
            .extract()
            .context("failed to load appr-fetch configuration")
    }

    pub fn apply_cli_overrides(&mut self, overrides: CliOverrides) {
        if let Some(source) = overrides.source {
            self.source = Some(source);
        }
        if let Some(token) = overrides.auth_token {
            self.auth_token = SecretString::new(token);
        }
        if overrides.decode_blobs {
            self.decode_blobs = true;
        }
    }
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::io::Write;

    const NO_APPR_ENV: [(&str, Option<&str>); 4] = [
        ("APPR__SOURCE", None),
        ("APPR__AUTH_TOKEN", None),
        ("APPR__REQUEST_TIMEOUT", None),
        ("APPR__PROXY__HTTP_PROXY", None),
    ];

    fn yaml_file(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        temp_env::with_vars(NO_APPR_ENV, || {
            let config = FetchConfig::load(None).unwrap();
            assert_eq!(config.source, None);
            assert!(config.auth_token.is_empty());
            assert_eq!(config.request_timeout, Duration::from_secs(30));
            assert!(config.proxy.is_none());
        });
    }

    #[test]
    fn test_yaml_layer() {
        let file = yaml_file(
            "source: https://quay.io/cnr\n\
             auth_token: tok123\n\
             request_timeout: 2m\n\
             proxy:\n  https_proxy: http://proxy.corp:3128\n  no_proxy: .corp\n",
        );

        temp_env::with_vars(NO_APPR_ENV, || {
            let config = FetchConfig::load(Some(file.path())).unwrap();
            assert_eq!(config.source.as_deref(), Some("https://quay.io/cnr"));
            assert_eq!(config.auth_token.expose(), "tok123");
            assert_eq!(config.request_timeout, Duration::from_secs(120));

            let proxy = config.proxy.unwrap();
            assert_eq!(proxy.https_proxy.as_deref(), Some("http://proxy.corp:3128"));
            assert_eq!(proxy.http_proxy, None);
            assert_eq!(proxy.no_proxy.as_deref(), Some(".corp"));
        });
    }

    #[test]
    fn test_env_overrides_yaml() {
        let file = yaml_file("source: https://quay.io/cnr\nrequest_timeout: 10s\n");

        temp_env::with_vars(
            [
                ("APPR__SOURCE", Some("https://mirror.example.com/cnr")),
                ("APPR__AUTH_TOKEN", None),
                ("APPR__REQUEST_TIMEOUT", None),
                ("APPR__PROXY__HTTP_PROXY", Some("http://proxy.example.com:8080")),
            ],
            || {
                let config = FetchConfig::load(Some(file.path())).unwrap();
                assert_eq!(
                    config.source.as_deref(),
                    Some("https://mirror.example.com/cnr")
                );
                assert_eq!(config.request_timeout, Duration::from_secs(10));
                assert_eq!(
                    config.proxy.unwrap().http_proxy.as_deref(),
                    Some("http://proxy.example.com:8080")
                );
            },
        );
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut config = FetchConfig {
            source: Some("https://quay.io/cnr".to_owned()),
            ..FetchConfig::default()
        };
        config.apply_cli_overrides(CliOverrides {
            source: Some("https://other.example.com".to_owned()),
            auth_token: Some("cli-token".to_owned()),
            decode_blobs: true,
        });

        assert_eq!(config.source.as_deref(), Some("https://other.example.com"));
        assert_eq!(config.auth_token.expose(), "cli-token");
        assert!(config.decode_blobs);
    }

    #[test]
    fn test_missing_file_rejected() {
        let err = FetchConfig::load(Some(Path::new("/nonexistent/appr.yaml"))).unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_bad_duration_rejected() {
        let file = yaml_file("request_timeout: soon\n");
        temp_env::with_vars(NO_APPR_ENV, || {
            assert!(FetchConfig::load(Some(file.path())).is_err());
        });
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = FetchConfig {
            auth_token: SecretString::new("tok123"),
            ..FetchConfig::default()
        };
        assert!(!format!("{config:?}").contains("tok123"));
    }
}
