//! Helm repository index
//!
//! Rendered from the cache's records: one entry list per chart name, each
//! version pointing at `charts/{name}-{version}.tgz`.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ocichart_core::{ChartRecord, download_url};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

use crate::error::{RepoError, Result};

/// Repository index (Helm-compatible)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartIndex {
    /// API version
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// When this index was generated
    #[serde(default = "Utc::now")]
    pub generated: DateTime<Utc>,

    /// Chart versions by chart name, names in sorted order
    #[serde(default)]
    pub entries: IndexMap<String, Vec<ChartEntry>>,
}

fn default_api_version() -> String {
    "v1".to_string()
}

impl Default for ChartIndex {
    fn default() -> Self {
        Self {
            api_version: default_api_version(),
            generated: Utc::now(),
            entries: IndexMap::new(),
        }
    }
}

impl ChartIndex {
    /// Build an index from records, dropping repeated digests
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = ChartRecord>,
    {
        let mut seen = HashSet::new();
        let mut entries: IndexMap<String, Vec<ChartEntry>> = IndexMap::new();

        for record in records {
            if !seen.insert(record.digest.clone()) {
                continue;
            }
            let entry = ChartEntry::from(record);
            entries.entry(entry.name.clone()).or_default().push(entry);
        }

        entries.sort_keys();
        for versions in entries.values_mut() {
            versions.sort_by(|a, b| compare_versions(&b.version, &a.version));
        }

        Self {
            entries,
            ..Default::default()
        }
    }

    /// Parse index from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| RepoError::Serialization(e.to_string()))
    }

    /// Render as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Get all versions of a chart, newest first
    pub fn get(&self, name: &str) -> Option<&Vec<ChartEntry>> {
        self.entries.get(name)
    }

    /// Get the latest (highest semver) version of a chart
    pub fn get_latest(&self, name: &str) -> Option<&ChartEntry> {
        self.entries
            .get(name)?
            .iter()
            .max_by(|a, b| compare_versions(&a.version, &b.version))
    }

    /// Get a specific version of a chart
    pub fn get_version(&self, name: &str, version: &str) -> Option<&ChartEntry> {
        self.entries
            .get(name)?
            .iter()
            .find(|e| e.version == version)
    }

    /// List all chart names
    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    /// Total number of chart versions
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Semver order; non-semver versions sort below semver ones
fn compare_versions(a: &str, b: &str) -> Ordering {
    match (Version::parse(a).ok(), Version::parse(b).ok()) {
        (Some(va), Some(vb)) => va.cmp(&vb),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => a.cmp(b),
    }
}

/// Chart version entry in the index
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartEntry {
    pub name: String,

    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,

    /// Chart type (application or library)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    /// Content digest
    #[serde(default)]
    pub digest: String,

    /// Download URLs, relative to the repository root
    #[serde(default)]
    pub urls: Vec<String>,
}

impl ChartEntry {
    /// Get the primary download URL
    pub fn download_url(&self) -> Option<&str> {
        self.urls.first().map(|s| s.as_str())
    }

    /// Parse version as semver
    pub fn parsed_version(&self) -> Option<Version> {
        Version::parse(&self.version).ok()
    }
}

impl From<ChartRecord> for ChartEntry {
    fn from(record: ChartRecord) -> Self {
        let urls = vec![download_url(&record.name, &record.version)];
        Self {
            name: record.name,
            version: record.version,
            description: record.description,
            api_version: record.api_version,
            app_version: record.app_version,
            r#type: record.r#type,
            digest: record.digest,
            urls,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, version: &str, digest: &str) -> ChartRecord {
        ChartRecord {
            name: name.to_string(),
            version: version.to_string(),
            description: Some(format!("{} chart", name)),
            api_version: Some("v2".to_string()),
            app_version: None,
            r#type: None,
            digest: digest.to_string(),
        }
    }

    fn sample_index() -> ChartIndex {
        ChartIndex::from_records(vec![
            record("nginx", "14.0.0", "sha256:n14"),
            record("redis", "17.0.0", "sha256:r17"),
            record("nginx", "15.0.0", "sha256:n15"),
            record("nginx", "15.0.0-rc.1", "sha256:n15rc"),
            record("nginx", "latest", "sha256:nlatest"),
        ])
    }

    #[test]
    fn test_entries_sorted() {
        let index = sample_index();
        assert_eq!(index.names(), vec!["nginx", "redis"]);

        let versions: Vec<_> = index
            .get("nginx")
            .unwrap()
            .iter()
            .map(|e| e.version.as_str())
            .collect();
        assert_eq!(versions, vec!["15.0.0", "15.0.0-rc.1", "14.0.0", "latest"]);
        assert_eq!(index.len(), 5);
    }

    #[test]
    fn test_dedup_by_digest() {
        let index = ChartIndex::from_records(vec![
            record("demo", "1.0.0", "sha256:same"),
            record("demo", "1.0.0", "sha256:same"),
        ]);
        assert_eq!(index.get("demo").unwrap().len(), 1);
    }

    #[test]
    fn test_get_latest() {
        let index = sample_index();
        let latest = index.get_latest("nginx").unwrap();
        assert_eq!(latest.version, "15.0.0");
        assert!(index.get_latest("postgresql").is_none());
    }

    #[test]
    fn test_get_version() {
        let index = sample_index();
        let v14 = index.get_version("nginx", "14.0.0").unwrap();
        assert_eq!(v14.digest, "sha256:n14");
        assert_eq!(v14.download_url(), Some("charts/nginx-14.0.0.tgz"));
    }

    #[test]
    fn test_yaml_rendering() {
        let index = sample_index();
        let yaml = index.to_yaml().unwrap();
        assert!(yaml.starts_with("apiVersion: v1\n"));
        assert!(yaml.contains("generated:"));
        assert!(yaml.contains("- charts/redis-17.0.0.tgz"));
        assert!(yaml.contains("digest: sha256:r17"));
        assert!(!yaml.contains("appVersion"));

        let parsed = ChartIndex::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.get("nginx").unwrap().len(), 4);
    }

    #[test]
    fn test_empty_index() {
        let index = ChartIndex::from_records(Vec::new());
        assert!(index.is_empty());
        let yaml = index.to_yaml().unwrap();
        assert!(yaml.contains("entries: {}"));
    }
}
