//! OCI pull transport used for chart downloads
//!
//! The engine only needs two calls: fetch a manifest and fetch one layer.
//! `OciClient` implements them on top of `oci-distribution`; tests substitute
//! their own `OciTransport`.

use async_trait::async_trait;
use oci_distribution::Reference;
use oci_distribution::client::{Client, ClientConfig, ClientProtocol};
use oci_distribution::errors::OciDistributionError;
use oci_distribution::manifest::OciDescriptor;
use oci_distribution::secrets::RegistryAuth;
use ocichart_core::{Descriptor, Manifest, media_types};
use std::future::Future;
use std::time::Duration;

use crate::config::Scheme;
use crate::credentials::Credentials;
use crate::error::{RepoError, Result};

/// Manifest and blob pulls by full reference (`host/repository:tag`)
#[async_trait]
pub trait OciTransport: Send + Sync {
    /// Pull the image manifest of `reference`
    async fn pull_manifest(&self, reference: &str) -> Result<Manifest>;

    /// Pull one layer blob of `reference`
    async fn pull_layer(&self, reference: &str, layer: &Descriptor) -> Result<Vec<u8>>;
}

/// `oci-distribution` backed transport
pub struct OciClient {
    client: Client,
    auth: RegistryAuth,
    timeout: Duration,
}

impl OciClient {
    pub fn new(
        scheme: Scheme,
        insecure_skip_tls: bool,
        credentials: Option<Credentials>,
        timeout: Duration,
    ) -> Self {
        let config = ClientConfig {
            protocol: match scheme {
                Scheme::Http => ClientProtocol::Http,
                Scheme::Https => ClientProtocol::Https,
            },
            accept_invalid_certificates: insecure_skip_tls,
            ..Default::default()
        };
        let auth = match credentials {
            Some(creds) => RegistryAuth::Basic(creds.username, creds.password),
            None => RegistryAuth::Anonymous,
        };

        Self {
            client: Client::new(config),
            auth,
            timeout,
        }
    }

    /// Parse an OCI reference string
    pub fn parse_reference(reference: &str) -> Result<Reference> {
        Reference::try_from(reference.to_string()).map_err(|e| RepoError::InvalidOciReference {
            reference: format!("{}: {}", reference, e),
        })
    }

    async fn bounded<T, F>(&self, reference: &str, call: F) -> Result<T>
    where
        F: Future<Output = std::result::Result<T, OciDistributionError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| map_oci_error(reference, e)),
            Err(_) => Err(RepoError::Timeout {
                seconds: self.timeout.as_secs(),
            }),
        }
    }
}

#[async_trait]
impl OciTransport for OciClient {
    async fn pull_manifest(&self, reference: &str) -> Result<Manifest> {
        let parsed = Self::parse_reference(reference)?;
        let (manifest, _digest) = self
            .bounded(reference, self.client.pull_image_manifest(&parsed, &self.auth))
            .await?;

        Ok(Manifest {
            schema_version: u32::from(manifest.schema_version),
            media_type: manifest.media_type,
            config: from_oci(&manifest.config),
            layers: manifest.layers.iter().map(from_oci).collect(),
        })
    }

    async fn pull_layer(&self, reference: &str, layer: &Descriptor) -> Result<Vec<u8>> {
        if !media_types::known().contains(&layer.media_type.as_str()) {
            return Err(RepoError::invalid_artifact(
                reference,
                format!("media type '{}' is not a chart media type", layer.media_type),
            ));
        }
        let parsed = Self::parse_reference(reference)?;
        let descriptor = OciDescriptor {
            media_type: layer.media_type.clone(),
            digest: layer.digest.clone(),
            size: layer.size,
            ..Default::default()
        };

        let mut data = Vec::new();
        self.bounded(reference, self.client.pull_blob(&parsed, &descriptor, &mut data))
            .await?;
        Ok(data)
    }
}

fn from_oci(descriptor: &OciDescriptor) -> Descriptor {
    Descriptor::new(
        descriptor.media_type.clone(),
        descriptor.digest.clone(),
        descriptor.size,
    )
}

/// A manifest that disappeared since indexing is reported as a missing chart
fn map_oci_error(reference: &str, e: OciDistributionError) -> RepoError {
    match e {
        OciDistributionError::AuthenticationFailure(message) => RepoError::AuthFailed { message },
        OciDistributionError::ImageManifestNotFoundError(message) => {
            tracing::debug!(reference = %reference, error = %message, "manifest not found");
            RepoError::ChartNotFound {
                path: reference.to_string(),
            }
        }
        other => RepoError::OciError {
            message: other.to_string(),
        },
    }
}
