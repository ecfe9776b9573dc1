//! Facade used by the HTTP layer and the CLI

use ocichart_core::InclusionPolicy;
use std::sync::Arc;

use crate::builder::{CatalogBuilder, PassSummary};
use crate::cache::CatalogCache;
use crate::config::RepoConfig;
use crate::error::Result;
use crate::index::ChartIndex;
use crate::oci::{OciClient, OciTransport};
use crate::retriever::ArtifactRetriever;
use crate::source::{CatalogSource, SourceKind};

/// Chart repository over one OCI backend
pub struct ChartService {
    builder: CatalogBuilder,
    retriever: ArtifactRetriever,
    cache: Arc<CatalogCache>,
}

impl ChartService {
    /// Connect to the configured endpoint. No catalog pass is run.
    pub async fn connect(config: &RepoConfig) -> Result<Self> {
        let credentials = config.credentials()?;
        let source = CatalogSource::connect(config, credentials.clone()).await?;
        let transport = OciClient::new(
            source.scheme(),
            config.endpoint.insecure_skip_tls,
            credentials,
            config.request_timeout,
        );
        let policy = InclusionPolicy::new(config.inclusion.clone());
        Ok(Self::new(source, policy, Arc::new(transport)))
    }

    pub fn new(source: CatalogSource, policy: InclusionPolicy, transport: Arc<dyn OciTransport>) -> Self {
        let cache = Arc::new(CatalogCache::new());
        let retriever = ArtifactRetriever::new(Arc::clone(&cache), transport, source.host());
        let builder = CatalogBuilder::new(source, policy, Arc::clone(&cache));
        Self {
            builder,
            retriever,
            cache,
        }
    }

    /// Current index rendered from the cache
    pub fn index(&self) -> ChartIndex {
        ChartIndex::from_records(self.cache.snapshot_records())
    }

    pub fn index_yaml(&self) -> Result<String> {
        self.index().to_yaml()
    }

    /// Chart archive bytes for `{name}-{version}.tgz`
    pub async fn chart(&self, path: &str) -> Result<Vec<u8>> {
        self.retriever.retrieve(path).await
    }

    /// Run (or join) a catalog pass
    pub async fn refresh(&self) -> Result<PassSummary> {
        self.builder.build().await
    }

    pub fn last_refresh(&self) -> Option<PassSummary> {
        self.builder.last_summary()
    }

    /// Number of cached chart versions
    pub fn chart_count(&self) -> usize {
        self.cache.len()
    }

    pub fn kind(&self) -> SourceKind {
        self.builder.source().kind()
    }

    pub fn endpoint(&self) -> &str {
        self.builder.source().api().base_url()
    }
}
