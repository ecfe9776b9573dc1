//! Distribution API v2 client
//!
//! Catalog and tag listing follow `Link` pagination. Manifests are requested
//! with the OCI image manifest `Accept` header.

use ocichart_core::{Manifest, OCI_MANIFEST_MEDIA_TYPE};
use serde::Deserialize;

use crate::error::{RepoError, Result};
use crate::http::{ApiClient, next_link};

/// Page size requested from `_catalog` and `tags/list`
const PAGE_SIZE: usize = 1000;

/// Upper bound on followed `Link` pages per listing
const MAX_PAGES: usize = 1000;

#[derive(Debug, Deserialize)]
struct CatalogPage {
    #[serde(default)]
    repositories: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct TagsPage {
    #[serde(default)]
    tags: Option<Vec<String>>,
}

/// Registry client
#[derive(Debug)]
pub struct RegistryClient {
    api: ApiClient,
}

impl RegistryClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// All repository names in the registry catalog
    pub async fn catalog(&self) -> Result<Vec<String>> {
        let first = format!("/v2/_catalog?n={}", PAGE_SIZE);
        self.paged(first, |bytes| {
            let page: CatalogPage = serde_json::from_slice(bytes)?;
            Ok(page.repositories.unwrap_or_default())
        })
        .await
    }

    /// All tags of one repository
    pub async fn tags(&self, name: &str) -> Result<Vec<String>> {
        let first = format!("/v2/{}/tags/list?n={}", name, PAGE_SIZE);
        self.paged(first, |bytes| {
            let page: TagsPage = serde_json::from_slice(bytes)?;
            Ok(page.tags.unwrap_or_default())
        })
        .await
    }

    /// Manifest of `name:reference`
    pub async fn manifest(&self, name: &str, reference: &str) -> Result<Manifest> {
        let path = format!("/v2/{}/manifests/{}", name, reference);
        let bytes = self
            .api
            .get_bytes(&path, Some(OCI_MANIFEST_MEDIA_TYPE))
            .await?;
        Manifest::from_slice(&bytes).map_err(|e| {
            RepoError::malformed(format!("{}:{}", name, reference), e.to_string())
        })
    }

    /// Blob content by digest
    pub async fn blob(&self, name: &str, digest: &str) -> Result<Vec<u8>> {
        let path = format!("/v2/{}/blobs/{}", name, digest);
        self.api.get_bytes(&path, None).await
    }

    async fn paged<F>(&self, first: String, parse: F) -> Result<Vec<String>>
    where
        F: Fn(&[u8]) -> Result<Vec<String>>,
    {
        let mut items = Vec::new();
        let mut next = Some(first);
        let mut pages = 0;

        while let Some(path) = next.take() {
            pages += 1;
            if pages > MAX_PAGES {
                tracing::warn!(path = %path, "listing exceeded {} pages, truncating", MAX_PAGES);
                break;
            }

            let response = self.api.get(&path).await?;
            let link = next_link(response.headers());
            let bytes = self.api.read_body(response).await?;
            items.extend(parse(&bytes)?);
            next = link;
        }
        Ok(items)
    }
}
