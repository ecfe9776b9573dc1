//! Chart records and the references used to re-fetch them

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Media types for Helm charts stored as OCI artifacts
pub mod media_types {
    /// Helm chart config
    pub const CHART_CONFIG: &str = "application/vnd.cncf.helm.config.v1+json";
    /// Helm chart content layer
    pub const CHART_CONTENT: &str = "application/tar+gzip";

    /// Media types accepted when pulling a chart
    pub fn known() -> Vec<&'static str> {
        vec![CHART_CONFIG, CHART_CONTENT]
    }
}

/// Chart metadata extracted from a manifest config blob or Harbor artifact
///
/// Identity for deduplication is `digest`, identity for addressing is
/// `(name, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRecord {
    pub name: String,

    pub version: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub api_version: Option<String>,

    #[serde(default)]
    pub app_version: Option<String>,

    /// Chart type (application or library)
    #[serde(default)]
    pub r#type: Option<String>,

    /// Content digest in `algorithm:hex` form
    #[serde(default)]
    pub digest: String,
}

impl ChartRecord {
    /// Parse a Helm chart config blob and attach the content digest
    pub fn from_config(bytes: &[u8], digest: impl Into<String>) -> Result<Self> {
        let record: Self = serde_json::from_slice(bytes)?;
        record.with_digest(digest)
    }

    /// Build a record from a JSON object carrying chart metadata
    /// (Harbor's artifact `extra_attrs`)
    pub fn from_attributes(attrs: &serde_json::Value, digest: impl Into<String>) -> Result<Self> {
        let record = Self::deserialize(attrs)?;
        record.with_digest(digest)
    }

    fn with_digest(mut self, digest: impl Into<String>) -> Result<Self> {
        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidChart {
                message: "chart name is empty".to_string(),
            });
        }
        if self.version.trim().is_empty() {
            return Err(CoreError::InvalidChart {
                message: format!("chart '{}' has an empty version", self.name),
            });
        }
        self.digest = digest.into();
        Ok(self)
    }

    /// Logical download path of this chart
    pub fn path(&self) -> String {
        logical_path(&self.name, &self.version)
    }
}

/// Everything needed to re-fetch a chart's payload from the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartReference {
    /// `repository:tag`, relative to the backend host
    pub coordinates: String,

    /// Digest of the record this reference was built for
    pub digest: String,
}

impl ChartReference {
    pub fn new(coordinates: impl Into<String>, digest: impl Into<String>) -> Self {
        Self {
            coordinates: coordinates.into(),
            digest: digest.into(),
        }
    }

    /// Full OCI reference for `host`
    pub fn oci_reference(&self, host: &str) -> String {
        format!("{}/{}", host.trim_end_matches('/'), self.coordinates)
    }
}

/// `{name}-{version}.tgz`
pub fn logical_path(name: &str, version: &str) -> String {
    format!("{}-{}.tgz", name, version)
}

/// OCI tag Helm pushes a chart version under (`+` is not valid in a tag)
pub fn oci_tag(version: &str) -> String {
    version.replace('+', "_")
}

/// Download URL of a chart, relative to the repository root
pub fn download_url(name: &str, version: &str) -> String {
    format!("charts/{}", logical_path(name, version))
}
