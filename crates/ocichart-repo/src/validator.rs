//! Chart-shape checks on manifests and Harbor artifacts
//!
//! Catalog-time failures are `NotAChart` (skipped quietly) or `Malformed`
//! (skipped with a warning). Download-time failures are `InvalidArtifact`.

use ocichart_core::{ChartRecord, Descriptor, Manifest, media_types};

use crate::error::{RepoError, Result};
use crate::harbor::Artifact;

/// Validates chart artifacts and extracts their metadata
pub struct ManifestValidator;

impl ManifestValidator {
    /// Check a catalog manifest and return its single content layer
    pub fn chart_layer<'a>(reference: &str, manifest: &'a Manifest) -> Result<&'a Descriptor> {
        if !manifest.is_chart() {
            return Err(RepoError::NotAChart {
                reference: reference.to_string(),
                media_type: manifest.config.media_type.clone(),
            });
        }
        content_layer(manifest).map_err(|message| RepoError::malformed(reference, message))
    }

    /// Build a record from a fetched config blob; the digest is the layer's
    pub fn record_from_config(reference: &str, config: &[u8], layer: &Descriptor) -> Result<ChartRecord> {
        ChartRecord::from_config(config, layer.digest.clone())
            .map_err(|e| RepoError::malformed(reference, e.to_string()))
    }

    /// Build a record from a Harbor artifact without fetching anything; the
    /// digest is the artifact's
    pub fn record_from_artifact(reference: &str, artifact: &Artifact) -> Result<ChartRecord> {
        if !artifact.is_chart() {
            return Err(RepoError::NotAChart {
                reference: reference.to_string(),
                media_type: artifact.media_type.clone(),
            });
        }
        ChartRecord::from_attributes(&artifact.extra_attrs, artifact.digest.clone())
            .map_err(|e| RepoError::malformed(reference, e.to_string()))
    }

    /// Re-check a manifest pulled for download
    pub fn download_layer<'a>(reference: &str, manifest: &'a Manifest) -> Result<&'a Descriptor> {
        if !manifest.is_chart() {
            return Err(RepoError::invalid_artifact(
                reference,
                format!("config media type is '{}'", manifest.config.media_type),
            ));
        }
        content_layer(manifest).map_err(|message| RepoError::invalid_artifact(reference, message))
    }
}

fn content_layer(manifest: &Manifest) -> std::result::Result<&Descriptor, String> {
    let layer = match manifest.layers.as_slice() {
        [layer] => layer,
        layers => return Err(format!("expected exactly 1 layer, found {}", layers.len())),
    };
    if layer.media_type != media_types::CHART_CONTENT {
        return Err(format!(
            "layer media type is '{}', expected '{}'",
            layer.media_type,
            media_types::CHART_CONTENT
        ));
    }
    if layer.size <= 0 {
        return Err(format!("layer size is {}", layer.size));
    }
    Ok(layer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    fn chart_manifest(layers: Vec<Descriptor>) -> Manifest {
        Manifest::new(
            Descriptor::new(media_types::CHART_CONFIG, "sha256:cfg", 64),
            layers,
        )
    }

    fn content(size: i64) -> Descriptor {
        Descriptor::new(media_types::CHART_CONTENT, "sha256:layer", size)
    }

    #[test]
    fn test_valid_chart() {
        let manifest = chart_manifest(vec![content(1024)]);
        let layer = ManifestValidator::chart_layer("a/b:1", &manifest).unwrap();
        assert_eq!(layer.digest, "sha256:layer");
    }

    #[test]
    fn test_not_a_chart() {
        let mut manifest = chart_manifest(vec![content(1024)]);
        manifest.config.media_type = "application/vnd.oci.image.config.v1+json".into();
        let err = ManifestValidator::chart_layer("a/b:1", &manifest).unwrap_err();
        assert!(matches!(err, RepoError::NotAChart { .. }));
    }

    #[test]
    fn test_layer_count() {
        let two = chart_manifest(vec![content(10), content(20)]);
        let err = ManifestValidator::chart_layer("a/b:1", &two).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Malformed);

        let none = chart_manifest(vec![]);
        assert!(ManifestValidator::chart_layer("a/b:1", &none).is_err());
    }

    #[test]
    fn test_layer_type_and_size() {
        let wrong_type = chart_manifest(vec![Descriptor::new("application/octet-stream", "sha256:x", 10)]);
        assert!(matches!(
            ManifestValidator::chart_layer("a/b:1", &wrong_type),
            Err(RepoError::Malformed { .. })
        ));

        let empty = chart_manifest(vec![content(0)]);
        assert!(ManifestValidator::chart_layer("a/b:1", &empty).is_err());
    }

    #[test]
    fn test_download_errors_are_invalid_artifact() {
        let two = chart_manifest(vec![content(10), content(20)]);
        assert!(matches!(
            ManifestValidator::download_layer("a/b:1", &two),
            Err(RepoError::InvalidArtifact { .. })
        ));
    }

    #[test]
    fn test_record_from_config_uses_layer_digest() {
        let layer = content(1024);
        let record = ManifestValidator::record_from_config(
            "a/b:1",
            br#"{"name":"b","version":"1.0.0"}"#,
            &layer,
        )
        .unwrap();
        assert_eq!(record.digest, "sha256:layer");

        let err = ManifestValidator::record_from_config("a/b:1", b"{}", &layer).unwrap_err();
        assert_eq!(err.class(), ErrorClass::Malformed);
    }

    #[test]
    fn test_record_from_artifact() {
        let artifact: Artifact = serde_json::from_value(serde_json::json!({
            "media_type": media_types::CHART_CONFIG,
            "digest": "sha256:manifest",
            "extra_attrs": {"name": "demo", "version": "2.0.0", "description": "Demo"}
        }))
        .unwrap();
        let record = ManifestValidator::record_from_artifact("acp/demo:2.0.0", &artifact).unwrap();
        assert_eq!(record.digest, "sha256:manifest");
        assert_eq!(record.description.as_deref(), Some("Demo"));

        let mut image = artifact.clone();
        image.media_type = "application/vnd.oci.image.config.v1+json".into();
        assert!(matches!(
            ManifestValidator::record_from_artifact("acp/demo:2.0.0", &image),
            Err(RepoError::NotAChart { .. })
        ));
    }
}
