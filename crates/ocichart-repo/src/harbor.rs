//! Harbor v2.0 API client
//!
//! Projects, repositories and artifacts are listed with `page_size=500`.
//! Repository names are returned as `project/repo` and are stripped of the
//! project prefix; names that still contain `/` are double-encoded in paths.

use ocichart_core::media_types;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::form_urlencoded::byte_serialize;

use crate::error::Result;
use crate::http::ApiClient;

/// Page size of every Harbor listing
pub const PAGE_SIZE: usize = 500;

/// Upper bound on pages read per listing
const MAX_PAGES: usize = 200;

/// `GET /api/v2.0/systeminfo`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemInfo {
    #[serde(default)]
    pub harbor_version: Option<String>,
}

impl SystemInfo {
    pub fn is_v2(&self) -> bool {
        self.harbor_version
            .as_deref()
            .is_some_and(|version| version.starts_with("v2"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub project_id: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct Repository {
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tag {
    pub name: String,
}

/// Artifact as listed by Harbor; chart metadata is carried in `extra_attrs`
#[derive(Debug, Clone, Deserialize)]
pub struct Artifact {
    #[serde(default)]
    pub id: i64,
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub manifest_media_type: String,
    #[serde(default)]
    pub project_id: i64,
    #[serde(default)]
    pub repository_id: i64,
    pub digest: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub extra_attrs: serde_json::Value,
    #[serde(default)]
    pub tags: Option<Vec<Tag>>,
}

impl Artifact {
    pub fn is_chart(&self) -> bool {
        self.media_type == media_types::CHART_CONFIG
    }
}

/// Harbor client
#[derive(Debug)]
pub struct HarborClient {
    api: ApiClient,
}

impl HarborClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Probe `/api/v2.0/systeminfo`
    pub async fn system_info(api: &ApiClient) -> Result<SystemInfo> {
        api.get_json("/api/v2.0/systeminfo").await
    }

    /// All projects visible to the caller
    pub async fn projects(&self) -> Result<Vec<Project>> {
        self.paged("/api/v2.0/projects?").await
    }

    /// Repository names (without project prefix), optionally fuzzy-filtered
    /// server side by `filter`
    pub async fn repositories(&self, project: &str, filter: Option<&str>) -> Result<Vec<String>> {
        let mut path = format!("/api/v2.0/projects/{}/repositories?", encode(project));
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            path.push_str(&format!("q=name%3D~{}&", encode(filter)));
        }

        let prefix = format!("{}/", project);
        let repositories: Vec<Repository> = self.paged(&path).await?;
        Ok(repositories
            .into_iter()
            .map(|repo| match repo.name.strip_prefix(&prefix) {
                Some(stripped) => stripped.to_string(),
                None => repo.name,
            })
            .collect())
    }

    /// Chart artifacts of one repository
    pub async fn artifacts(&self, project: &str, repository: &str) -> Result<Vec<Artifact>> {
        let path = format!(
            "/api/v2.0/projects/{}/repositories/{}/artifacts?with_tag=true&q=media_type%3D{}&",
            encode(project),
            encode_repository(repository),
            encode(media_types::CHART_CONFIG),
        );
        self.paged(&path).await
    }

    /// One artifact by tag or digest
    pub async fn artifact(&self, project: &str, repository: &str, reference: &str) -> Result<Artifact> {
        let path = format!(
            "/api/v2.0/projects/{}/repositories/{}/artifacts/{}",
            encode(project),
            encode_repository(repository),
            encode(reference),
        );
        self.api.get_json(&path).await
    }

    async fn paged<T: DeserializeOwned>(&self, base: &str) -> Result<Vec<T>> {
        let mut items = Vec::new();
        for page in 1..=MAX_PAGES {
            let path = format!("{}page={}&page_size={}", base, page, PAGE_SIZE);
            let batch: Vec<T> = self.api.get_json(&path).await?;
            let done = batch.len() < PAGE_SIZE;
            items.extend(batch);
            if done {
                return Ok(items);
            }
        }
        tracing::warn!(path = %base, "listing exceeded {} pages, truncating", MAX_PAGES);
        Ok(items)
    }
}

fn encode(value: &str) -> String {
    byte_serialize(value.as_bytes()).collect()
}

/// Repository path segment: `a/b` becomes `a%252Fb`
pub fn encode_repository(name: &str) -> String {
    encode(&encode(name))
}
