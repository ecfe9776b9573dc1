//! Backend credentials
//!
//! - Basic credentials, inline or from a Docker `config.json` /
//!   `.dockerconfigjson` (`auths` keyed by registry host)
//! - Credentials are never sent to a different origin after a redirect

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use url::Url;

use crate::error::{RepoError, Result};

/// Username/password pair for Basic authentication
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Decode a base64 `user:password` token as stored in docker configs
    pub fn from_encoded(encoded: &str) -> Result<Self> {
        let decoded = STANDARD
            .decode(encoded.trim())
            .map_err(|e| RepoError::AuthFailed {
                message: format!("Invalid base64 auth entry: {}", e),
            })?;
        let decoded = String::from_utf8(decoded).map_err(|_| RepoError::AuthFailed {
            message: "Auth entry is not valid UTF-8".to_string(),
        })?;
        let (username, password) = decoded.split_once(':').ok_or_else(|| RepoError::AuthFailed {
            message: "Auth entry is not in user:password form".to_string(),
        })?;
        Ok(Self::new(username, password))
    }

    /// `Authorization` header value
    pub fn auth_header(&self) -> String {
        let encoded = STANDARD.encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", encoded)
    }
}

/// Docker config.json format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DockerConfig {
    #[serde(default)]
    pub auths: HashMap<String, DockerAuth>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerAuth {
    #[serde(default)]
    pub auth: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl DockerConfig {
    /// Load a docker config; a missing file is an empty config
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "docker config not found");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)?;
        Ok(config)
    }

    /// Credentials for `host[:port]`; entry keys may carry a scheme or path
    pub fn credentials_for_host(&self, host: &str) -> Option<Credentials> {
        let entry = self
            .auths
            .iter()
            .find(|(key, _)| registry_host(key) == host)
            .map(|(_, auth)| auth)?;

        if let (Some(username), Some(password)) = (&entry.username, &entry.password) {
            return Some(Credentials::new(username, password));
        }
        match entry.auth.as_deref().map(Credentials::from_encoded) {
            Some(Ok(credentials)) => Some(credentials),
            Some(Err(e)) => {
                tracing::warn!(host = %host, error = %e, "ignoring unreadable docker auth entry");
                None
            }
            None => None,
        }
    }
}

/// `https://registry.local:5000/v1/` -> `registry.local:5000`
fn registry_host(key: &str) -> &str {
    let key = key
        .strip_prefix("https://")
        .or_else(|| key.strip_prefix("http://"))
        .unwrap_or(key);
    key.split('/').next().unwrap_or(key)
}

/// Check if two URLs are same-origin (for redirect safety)
pub fn same_origin(url1: &str, url2: &str) -> bool {
    match (Url::parse(url1), Url::parse(url2)) {
        (Ok(u1), Ok(u2)) => {
            u1.scheme() == u2.scheme()
                && u1.host() == u2.host()
                && u1.port_or_known_default() == u2.port_or_known_default()
        }
        _ => false,
    }
}
