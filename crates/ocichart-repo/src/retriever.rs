//! Chart download: look up the reference, re-pull and re-check the manifest,
//! then return the single content layer

use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::cache::CatalogCache;
use crate::error::{RepoError, Result};
use crate::oci::OciTransport;
use crate::validator::ManifestValidator;

/// Fetches chart archives for cached references
pub struct ArtifactRetriever {
    cache: Arc<CatalogCache>,
    transport: Arc<dyn OciTransport>,
    host: String,
}

impl ArtifactRetriever {
    pub fn new(cache: Arc<CatalogCache>, transport: Arc<dyn OciTransport>, host: impl Into<String>) -> Self {
        Self {
            cache,
            transport,
            host: host.into(),
        }
    }

    /// Bytes of the chart archive at `path` (`{name}-{version}.tgz`)
    pub async fn retrieve(&self, path: &str) -> Result<Vec<u8>> {
        let reference = self
            .cache
            .get_by_path(path)
            .ok_or_else(|| RepoError::ChartNotFound {
                path: path.to_string(),
            })?;

        let oci_reference = reference.oci_reference(&self.host);
        tracing::debug!(path = %path, reference = %oci_reference, "retrieving chart");

        let manifest = self.transport.pull_manifest(&oci_reference).await?;
        let layer = ManifestValidator::download_layer(&oci_reference, &manifest)?;
        let data = self.transport.pull_layer(&oci_reference, layer).await?;

        if data.len() as u64 != layer.size as u64 {
            return Err(RepoError::invalid_artifact(
                &oci_reference,
                format!("layer is {} bytes, manifest declares {}", data.len(), layer.size),
            ));
        }
        let actual = compute_digest(&data);
        if !digest_matches(&layer.digest, &actual) {
            return Err(RepoError::invalid_artifact(
                &oci_reference,
                format!("layer digest mismatch: expected {}, got {}", layer.digest, actual),
            ));
        }

        Ok(data)
    }
}

/// Compute SHA256 digest of data
pub fn compute_digest(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Compare digests; only `sha256` is verified, other algorithms are accepted
fn digest_matches(expected: &str, actual: &str) -> bool {
    match expected.split_once(':') {
        Some((algorithm, hex)) if algorithm.eq_ignore_ascii_case("sha256") => {
            actual.trim_start_matches("sha256:").eq_ignore_ascii_case(hex.trim())
        }
        Some((algorithm, _)) => {
            tracing::debug!(algorithm = %algorithm, "digest algorithm not verified");
            true
        }
        None => actual.trim_start_matches("sha256:").eq_ignore_ascii_case(expected.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_digest() {
        let digest = compute_digest(b"hello world");
        assert_eq!(
            digest,
            "sha256:b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_digest_matches() {
        let actual = compute_digest(b"hello world");
        assert!(digest_matches(&actual, &actual));
        assert!(digest_matches(&actual.to_uppercase().replace("SHA256", "sha256"), &actual));
        assert!(!digest_matches("sha256:abc", &actual));
        assert!(digest_matches("sha512:whatever", &actual));
    }
}
