//! Engine configuration
//!
//! ```yaml
//! endpoint:
//!   url: harbor.example.com
//!   username: robot$charts
//!   password: secret
//!   insecureSkipTls: true
//! requestTimeout: 30s
//! refreshInterval: 10m
//! inclusion:
//!   mode: match
//!   entries:
//!     acp: []
//! ```

use ocichart_core::InclusionConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::credentials::{Credentials, DockerConfig};
use crate::error::{RepoError, Result};

/// Top-level configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoConfig {
    /// Backend to expose
    pub endpoint: Endpoint,

    /// Which charts a catalog pass may see
    #[serde(default)]
    pub inclusion: InclusionConfig,

    /// Period of background catalog passes (none = startup and manual only)
    #[serde(default, with = "humantime_serde")]
    pub refresh_interval: Option<Duration>,

    /// Upper bound of every backend call
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Docker `config.json` or `.dockerconfigjson` consulted when the
    /// endpoint carries no credentials
    #[serde(default)]
    pub docker_config: Option<PathBuf>,
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

impl RepoConfig {
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            inclusion: InclusionConfig::default(),
            refresh_interval: None,
            request_timeout: default_request_timeout(),
            docker_config: None,
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.endpoint.host()?;
        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Credentials for the endpoint: inline values first, then the docker config
    pub fn credentials(&self) -> Result<Option<Credentials>> {
        if let Some(credentials) = self.endpoint.credentials() {
            return Ok(Some(credentials));
        }
        match &self.docker_config {
            Some(path) => {
                let docker = DockerConfig::load_from(path)?;
                Ok(docker.credentials_for_host(self.endpoint.host()?))
            }
            None => Ok(None),
        }
    }
}

/// URL scheme used to reach the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scheme {
    type Err = RepoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Scheme::Http),
            "https" => Ok(Scheme::Https),
            other => Err(RepoError::InvalidConfig {
                message: format!("unsupported scheme '{}', expected http or https", other),
            }),
        }
    }
}

/// Registry or Harbor endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    /// Host with optional port, optionally prefixed by `http://` or `https://`
    pub url: String,

    /// Explicit scheme; overrides any URL prefix
    #[serde(default)]
    pub scheme: Option<Scheme>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Accept self-signed certificates
    #[serde(default)]
    pub insecure_skip_tls: bool,
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// `host[:port]` without scheme or trailing slash
    pub fn host(&self) -> Result<&str> {
        let url = self.url.trim();
        let host = url
            .strip_prefix("https://")
            .or_else(|| url.strip_prefix("http://"))
            .unwrap_or(url)
            .trim_end_matches('/');

        if host.is_empty() || host.contains("://") {
            return Err(RepoError::InvalidEndpoint {
                url: self.url.clone(),
                reason: "expected host[:port], optionally prefixed by http:// or https://"
                    .to_string(),
            });
        }
        Ok(host)
    }

    /// Scheme known without probing: explicit setting, then URL prefix
    pub fn declared_scheme(&self) -> Option<Scheme> {
        if self.scheme.is_some() {
            return self.scheme;
        }
        let url = self.url.trim();
        if url.starts_with("https://") {
            Some(Scheme::Https)
        } else if url.starts_with("http://") {
            Some(Scheme::Http)
        } else {
            None
        }
    }

    /// `scheme://host[:port]`
    pub fn base_url(&self, scheme: Scheme) -> Result<String> {
        Ok(format!("{}://{}", scheme, self.host()?))
    }

    /// Inline credentials, when both halves are set
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) if !username.is_empty() => {
                Some(Credentials::new(username, password))
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_endpoint_host() {
        assert_eq!(Endpoint::new("harbor.example.com").host().unwrap(), "harbor.example.com");
        assert_eq!(
            Endpoint::new("https://harbor.example.com:8443/").host().unwrap(),
            "harbor.example.com:8443"
        );
        assert!(Endpoint::new("").host().is_err());
        assert!(Endpoint::new("ftp://x").host().is_err());
    }

    #[test]
    fn test_declared_scheme() {
        assert_eq!(Endpoint::new("registry.local").declared_scheme(), None);
        assert_eq!(
            Endpoint::new("http://registry.local").declared_scheme(),
            Some(Scheme::Http)
        );

        let mut explicit = Endpoint::new("http://registry.local");
        explicit.scheme = Some(Scheme::Https);
        assert_eq!(explicit.declared_scheme(), Some(Scheme::Https));
        assert_eq!(
            explicit.base_url(Scheme::Https).unwrap(),
            "https://registry.local"
        );
    }

    #[test]
    fn test_scheme_from_str() {
        assert_eq!("HTTPS".parse::<Scheme>().unwrap(), Scheme::Https);
        assert!("oci".parse::<Scheme>().is_err());
    }

    #[test]
    fn test_inline_credentials() {
        let endpoint = Endpoint::new("registry.local").with_basic_auth("admin", "secret");
        let creds = endpoint.credentials().unwrap();
        assert_eq!(creds.username, "admin");

        let mut partial = Endpoint::new("registry.local");
        partial.username = Some("admin".into());
        assert!(partial.credentials().is_none());
    }

    #[test]
    fn test_config_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
endpoint:
  url: https://harbor.example.com
  insecureSkipTls: true
requestTimeout: 5s
refreshInterval: 10m
inclusion:
  mode: strict
  targets:
    - repository: acp/chart-demo
      version: 2.0.0
"#
        )
        .unwrap();

        let config = RepoConfig::load_from(file.path()).unwrap();
        assert!(config.endpoint.insecure_skip_tls);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.refresh_interval, Some(Duration::from_secs(600)));
        assert!(matches!(config.inclusion, InclusionConfig::Strict { .. }));
    }

    #[test]
    fn test_config_defaults_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("ocichart.yaml");

        let config = RepoConfig::new(Endpoint::new("registry.local:5000"));
        config.save_to(&path).unwrap();

        let loaded = RepoConfig::load_from(&path).unwrap();
        assert_eq!(loaded.request_timeout, Duration::from_secs(30));
        assert!(loaded.refresh_interval.is_none());
        assert!(matches!(loaded.inclusion, InclusionConfig::Open));
    }

    #[test]
    fn test_credentials_from_docker_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"auths": {"https://registry.local:5000": {"username": "bot", "password": "pw"}}}"#,
        )
        .unwrap();

        let mut config = RepoConfig::new(Endpoint::new("registry.local:5000"));
        config.docker_config = Some(path);
        let creds = config.credentials().unwrap().unwrap();
        assert_eq!(creds.username, "bot");
        assert_eq!(creds.password, "pw");

        config.endpoint = config.endpoint.with_basic_auth("inline", "x");
        assert_eq!(config.credentials().unwrap().unwrap().username, "inline");
    }
}
