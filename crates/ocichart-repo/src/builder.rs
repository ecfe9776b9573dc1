//! One catalog pass: walk the source under the inclusion policy and fill
//! the cache
//!
//! Passes are serialized. A caller that had to wait for a running pass gets
//! that pass's summary instead of starting another one.

use futures::stream::{self, StreamExt};
use ocichart_core::{ChartRecord, ChartReference, InclusionPolicy, PolicyMode, oci_tag};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::cache::CatalogCache;
use crate::error::{ErrorClass, RepoError, Result};
use crate::harbor::{Artifact, HarborClient};
use crate::registry::RegistryClient;
use crate::source::CatalogSource;
use crate::validator::ManifestValidator;

/// Concurrent Harbor artifact listings per project
const DEFAULT_CONCURRENCY: usize = 4;

/// Outcome of one catalog pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    /// Records committed to the cache
    pub records: usize,
    /// Candidates skipped (not charts, unauthorized, policy refusals)
    pub skipped: usize,
    /// Candidates rejected as malformed charts
    pub rejected: usize,
    /// The walk stopped early on a transport failure
    pub interrupted: bool,
}

enum Step {
    Continue,
    EndRepository,
    Abort,
}

#[derive(Default)]
struct PassState {
    summary: PassSummary,
    seen: HashSet<String>,
}

impl PassState {
    /// First time this digest shows up in the pass
    fn first_sighting(&mut self, digest: &str) -> bool {
        self.seen.insert(digest.to_string())
    }

    fn accept(&mut self, cache: &CatalogCache, record: ChartRecord, reference: ChartReference) {
        tracing::debug!(
            chart = %record.name,
            version = %record.version,
            coordinates = %reference.coordinates,
            "chart accepted"
        );
        cache.commit(record, reference);
        self.summary.records += 1;
    }

    fn handle(&mut self, candidate: &str, err: RepoError) -> Step {
        match err.class() {
            ErrorClass::Transport => {
                tracing::warn!(candidate = %candidate, error = %err, "backend unreachable, stopping catalog walk");
                self.summary.interrupted = true;
                Step::Abort
            }
            ErrorClass::SkipCandidate => {
                self.summary.skipped += 1;
                if let RepoError::NotAChart { .. } = err {
                    tracing::debug!(candidate = %candidate, "{}", err);
                    Step::EndRepository
                } else {
                    tracing::info!(candidate = %candidate, error = %err, "candidate skipped");
                    Step::Continue
                }
            }
            ErrorClass::Malformed => {
                tracing::warn!(candidate = %candidate, error = %err, "malformed chart skipped");
                self.summary.rejected += 1;
                Step::Continue
            }
        }
    }
}

/// Orchestrates catalog passes for one source
pub struct CatalogBuilder {
    source: CatalogSource,
    policy: InclusionPolicy,
    cache: Arc<CatalogCache>,
    concurrency: usize,
    gate: tokio::sync::Mutex<()>,
    generation: AtomicU64,
    last: std::sync::Mutex<Option<PassSummary>>,
}

impl CatalogBuilder {
    pub fn new(source: CatalogSource, policy: InclusionPolicy, cache: Arc<CatalogCache>) -> Self {
        Self {
            source,
            policy,
            cache,
            concurrency: DEFAULT_CONCURRENCY,
            gate: tokio::sync::Mutex::new(()),
            generation: AtomicU64::new(0),
            last: std::sync::Mutex::new(None),
        }
    }

    /// Bound on concurrent artifact listings (at least 1)
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn source(&self) -> &CatalogSource {
        &self.source
    }

    pub fn cache(&self) -> &Arc<CatalogCache> {
        &self.cache
    }

    /// Number of completed passes
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Run a pass, or reuse the one that completed while this call waited.
    ///
    /// Errors only when the top-level listing call fails.
    pub async fn build(&self) -> Result<PassSummary> {
        let observed = self.generation();
        let _gate = self.gate.lock().await;

        if self.generation() != observed {
            if let Some(summary) = self.last_summary() {
                tracing::debug!("catalog pass completed while waiting, reusing it");
                return Ok(summary);
            }
        }

        let started = std::time::Instant::now();
        let summary = self.run_pass().await?;
        tracing::info!(
            records = summary.records,
            skipped = summary.skipped,
            rejected = summary.rejected,
            interrupted = summary.interrupted,
            cached = self.cache.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "catalog pass finished"
        );

        if let Ok(mut last) = self.last.lock() {
            *last = Some(summary);
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
        Ok(summary)
    }

    /// Summary of the most recent successful pass
    pub fn last_summary(&self) -> Option<PassSummary> {
        self.last.lock().ok().and_then(|last| *last)
    }

    async fn run_pass(&self) -> Result<PassSummary> {
        let mut state = PassState::default();
        match (&self.source, self.policy.mode()) {
            (CatalogSource::Registry(client), PolicyMode::Strict) => {
                self.registry_strict(client, &mut state).await
            }
            (CatalogSource::Harbor(client), PolicyMode::Strict) => {
                self.harbor_strict(client, &mut state).await
            }
            (CatalogSource::Registry(client), _) => self.registry_walk(client, &mut state).await?,
            (CatalogSource::Harbor(client), _) => self.harbor_walk(client, &mut state).await?,
        }
        Ok(state.summary)
    }

    // ============ Registry ============

    async fn registry_walk(&self, client: &RegistryClient, state: &mut PassState) -> Result<()> {
        let catalog = client.catalog().await?;
        let candidates = self.policy.match_candidates(&catalog);
        tracing::debug!(catalog = catalog.len(), eligible = candidates.len(), "registry catalog listed");

        'images: for (image, tags) in candidates {
            let tags = if tags.is_empty() {
                match client.tags(&image).await {
                    Ok(tags) => tags,
                    Err(e) => match state.handle(&image, e) {
                        Step::Abort => return Ok(()),
                        _ => continue,
                    },
                }
            } else {
                tags
            };

            for tag in tags {
                if let Err(e) = self.registry_record(client, &image, &tag, state).await {
                    match state.handle(&format!("{}:{}", image, tag), e) {
                        Step::Abort => return Ok(()),
                        Step::EndRepository => continue 'images,
                        Step::Continue => {}
                    }
                }
            }
        }
        Ok(())
    }

    async fn registry_strict(&self, client: &RegistryClient, state: &mut PassState) {
        for target in self.policy.strict_targets() {
            let tag = oci_tag(&target.version);
            let lookup = async {
                target.split()?;
                self.registry_record(client, &target.repository, &tag, state).await
            };
            let candidate = format!("{}:{}", target.repository, tag);
            let outcome = lookup.await;
            if let Err(e) = outcome {
                state.handle(&candidate, declared_target_error(&candidate, e));
            }
        }
    }

    async fn registry_record(
        &self,
        client: &RegistryClient,
        image: &str,
        tag: &str,
        state: &mut PassState,
    ) -> Result<()> {
        let coordinates = format!("{}:{}", image, tag);
        let manifest = client.manifest(image, tag).await?;
        let layer = ManifestValidator::chart_layer(&coordinates, &manifest)?;
        if !state.first_sighting(&layer.digest) {
            return Ok(());
        }

        let record = match self.cache.get_by_digest(&layer.digest) {
            Some(record) => record,
            None => {
                let config = client.blob(image, &manifest.config.digest).await?;
                ManifestValidator::record_from_config(&coordinates, &config, layer)?
            }
        };
        let reference = ChartReference::new(coordinates, layer.digest.clone());
        state.accept(&self.cache, record, reference);
        Ok(())
    }

    // ============ Harbor ============

    async fn harbor_walk(&self, client: &HarborClient, state: &mut PassState) -> Result<()> {
        let plan: Vec<(String, Vec<Option<String>>)> = match self.policy.mode() {
            PolicyMode::Match => self
                .policy
                .match_table()
                .map(|(project, filters)| {
                    let filters = if filters.is_empty() {
                        vec![None]
                    } else {
                        filters.iter().cloned().map(Some).collect()
                    };
                    (project.to_string(), filters)
                })
                .collect(),
            _ => client
                .projects()
                .await?
                .into_iter()
                .map(|project| (project.name, vec![None]))
                .collect(),
        };

        for (project, filters) in plan {
            let mut repositories: Vec<String> = Vec::new();
            for filter in filters {
                match client.repositories(&project, filter.as_deref()).await {
                    Ok(found) => {
                        // The server-side filter is a substring match
                        for repo in found {
                            if filter.as_deref().is_some_and(|wanted| wanted != repo) {
                                continue;
                            }
                            if !repositories.contains(&repo) {
                                repositories.push(repo);
                            }
                        }
                    }
                    Err(e) => match state.handle(&project, e) {
                        Step::Abort => return Ok(()),
                        _ => continue,
                    },
                }
            }

            let project = project.as_str();
            let listings: Vec<_> = stream::iter(repositories)
                .map(|repo| async move {
                    let artifacts = client.artifacts(project, &repo).await;
                    (repo, artifacts)
                })
                .buffered(self.concurrency)
                .collect()
                .await;

            for (repo, artifacts) in listings {
                let artifacts = match artifacts {
                    Ok(artifacts) => artifacts,
                    Err(e) => match state.handle(&format!("{}/{}", project, repo), e) {
                        Step::Abort => return Ok(()),
                        _ => continue,
                    },
                };

                for artifact in artifacts {
                    let candidate = format!("{}/{}@{}", project, repo, artifact.digest);
                    match self.harbor_record(&candidate, &artifact, state) {
                        Ok(Some(record)) => {
                            let coordinates =
                                format!("{}/{}:{}", project, repo, oci_tag(&record.version));
                            let reference = ChartReference::new(coordinates, record.digest.clone());
                            state.accept(&self.cache, record, reference);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            state.handle(&candidate, e);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    async fn harbor_strict(&self, client: &HarborClient, state: &mut PassState) {
        for target in self.policy.strict_targets() {
            let tag = oci_tag(&target.version);
            let candidate = format!("{}:{}", target.repository, tag);
            let lookup = async {
                let (project, repo) = target.split()?;
                client.artifact(project, repo, &tag).await
            };

            let outcome = match lookup.await {
                Ok(artifact) => self.harbor_record(&candidate, &artifact, state),
                Err(e) => Err(declared_target_error(&candidate, e)),
            };
            match outcome {
                Ok(Some(record)) => {
                    let reference = ChartReference::new(candidate, record.digest.clone());
                    state.accept(&self.cache, record, reference);
                }
                Ok(None) => {}
                Err(e) => {
                    state.handle(&candidate, e);
                }
            }
        }
    }

    /// Record for an artifact, or `None` when this pass already saw its digest.
    /// Digests already cached are reused without parsing the artifact again.
    fn harbor_record(
        &self,
        candidate: &str,
        artifact: &Artifact,
        state: &mut PassState,
    ) -> Result<Option<ChartRecord>> {
        if !state.first_sighting(&artifact.digest) {
            return Ok(None);
        }
        match self.cache.get_by_digest(&artifact.digest) {
            Some(record) => Ok(Some(record)),
            None => ManifestValidator::record_from_artifact(candidate, artifact).map(Some),
        }
    }
}

/// A strict target names one exact artifact, so its absence is a configuration defect
fn declared_target_error(candidate: &str, err: RepoError) -> RepoError {
    if err.is_not_found() {
        RepoError::malformed(candidate, format!("declared target does not exist: {}", err))
    } else {
        err
    }
}
