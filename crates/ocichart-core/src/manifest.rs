//! OCI image manifest as seen by the catalog engine
//!
//! Only the fields the chart checks need are modelled. Unknown fields
//! (annotations, subject, artifactType, ...) are ignored on parse.

use serde::{Deserialize, Serialize};

use crate::chart::media_types;
use crate::error::{CoreError, Result};

/// Media type of an OCI image manifest
pub const OCI_MANIFEST_MEDIA_TYPE: &str = "application/vnd.oci.image.manifest.v1+json";

/// Content descriptor (config blob or layer)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content
    #[serde(default)]
    pub media_type: String,

    /// Digest in `algorithm:hex` form
    pub digest: String,

    /// Declared size in bytes
    #[serde(default)]
    pub size: i64,
}

impl Descriptor {
    pub fn new(media_type: impl Into<String>, digest: impl Into<String>, size: i64) -> Self {
        Self {
            media_type: media_type.into(),
            digest: digest.into(),
            size,
        }
    }

    /// Hex part of the digest (`sha256:abc` -> `abc`)
    pub fn encoded_digest(&self) -> &str {
        self.digest
            .split_once(':')
            .map(|(_, hex)| hex)
            .unwrap_or(&self.digest)
    }
}

/// OCI image manifest: one config descriptor plus content layers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    #[serde(default)]
    pub media_type: Option<String>,

    pub config: Descriptor,

    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

fn default_schema_version() -> u32 {
    2
}

impl Manifest {
    /// Build a manifest in the shape Helm pushes charts
    pub fn new(config: Descriptor, layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: default_schema_version(),
            media_type: Some(OCI_MANIFEST_MEDIA_TYPE.to_string()),
            config,
            layers,
        }
    }

    /// Parse a manifest from raw JSON bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(CoreError::from)
    }

    /// Whether the config descriptor declares a chart
    pub fn is_chart(&self) -> bool {
        self.config.media_type == media_types::CHART_CONFIG
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_helm_manifest() {
        let json = br#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.manifest.v1+json",
            "config": {
                "mediaType": "application/vnd.cncf.helm.config.v1+json",
                "digest": "sha256:c0ffee",
                "size": 117
            },
            "layers": [
                {
                    "mediaType": "application/tar+gzip",
                    "digest": "sha256:beef",
                    "size": 1024,
                    "annotations": {"org.opencontainers.image.title": "mychart-1.0.0.tgz"}
                }
            ]
        }"#;

        let manifest = Manifest::from_slice(json).unwrap();
        assert!(manifest.is_chart());
        assert_eq!(manifest.layers.len(), 1);
        assert_eq!(manifest.layers[0].size, 1024);
        assert_eq!(manifest.layers[0].encoded_digest(), "beef");
    }

    #[test]
    fn test_parse_without_layers() {
        let json = br#"{"config": {"mediaType": "application/vnd.oci.image.config.v1+json", "digest": "sha256:1"}}"#;
        let manifest = Manifest::from_slice(json).unwrap();
        assert_eq!(manifest.schema_version, 2);
        assert!(manifest.layers.is_empty());
        assert!(!manifest.is_chart());
    }

    #[test]
    fn test_parse_garbage() {
        assert!(Manifest::from_slice(b"not json").is_err());
    }
}
