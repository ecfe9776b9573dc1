//! Catalog source: one backend variant selected by probing the endpoint
//!
//! A single probe of `/api/v2.0/systeminfo` decides the variant. A response
//! whose `harbor_version` starts with `v2` selects Harbor; anything else,
//! failures included, selects the plain registry variant.

use crate::config::{RepoConfig, Scheme};
use crate::credentials::Credentials;
use crate::error::Result;
use crate::harbor::HarborClient;
use crate::http::{ApiClient, resolve_scheme};
use crate::registry::RegistryClient;

/// Backend variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Registry,
    Harbor,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceKind::Registry => f.write_str("registry"),
            SourceKind::Harbor => f.write_str("harbor"),
        }
    }
}

/// Artifact catalog backend
#[derive(Debug)]
pub enum CatalogSource {
    Registry(RegistryClient),
    Harbor(HarborClient),
}

impl CatalogSource {
    /// Resolve the scheme, build the shared client and probe the variant
    pub async fn connect(config: &RepoConfig, credentials: Option<Credentials>) -> Result<Self> {
        let endpoint = &config.endpoint;
        let scheme = resolve_scheme(endpoint, config.request_timeout).await?;
        let api = ApiClient::new(
            endpoint.base_url(scheme)?,
            credentials,
            endpoint.insecure_skip_tls,
            config.request_timeout,
        )?;
        let source = Self::probe(api).await;
        tracing::info!(
            endpoint = %source.api().base_url(),
            backend = %source.kind(),
            "catalog source selected"
        );
        Ok(source)
    }

    /// Select the variant for an already configured client
    pub async fn probe(api: ApiClient) -> Self {
        match HarborClient::system_info(&api).await {
            Ok(info) if info.is_v2() => CatalogSource::Harbor(HarborClient::new(api)),
            Ok(info) => {
                tracing::debug!(version = ?info.harbor_version, "not a Harbor v2 endpoint");
                CatalogSource::Registry(RegistryClient::new(api))
            }
            Err(e) => {
                tracing::debug!(error = %e, "Harbor probe failed, using registry API");
                CatalogSource::Registry(RegistryClient::new(api))
            }
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            CatalogSource::Registry(_) => SourceKind::Registry,
            CatalogSource::Harbor(_) => SourceKind::Harbor,
        }
    }

    pub fn api(&self) -> &ApiClient {
        match self {
            CatalogSource::Registry(client) => client.api(),
            CatalogSource::Harbor(client) => client.api(),
        }
    }

    /// `host[:port]` that chart references are relative to
    pub fn host(&self) -> &str {
        let base = self.api().base_url();
        base.split_once("://").map(|(_, host)| host).unwrap_or(base)
    }

    pub fn scheme(&self) -> Scheme {
        if self.api().base_url().starts_with("http://") {
            Scheme::Http
        } else {
            Scheme::Https
        }
    }
}
