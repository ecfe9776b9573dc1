//! Inclusion policy: which projects, repositories and tags a catalog pass may see
//!
//! Three modes:
//! - **open**: everything reachable
//! - **match**: an ordered table of `key -> tags`, where a key is a project or
//!   image name, or a regular expression over candidate names
//! - **strict**: an explicit list of `(repository, version)` pairs; catalog
//!   listing calls are not made at all

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{CoreError, Result};

/// Policy configuration as loaded from disk
///
/// ```yaml
/// mode: match
/// entries:
///   "^acp/chart-.*$": ["v1", "v2"]
///   proj: []
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum InclusionConfig {
    /// Enumerate everything reachable
    #[default]
    Open,

    /// Enumerate only entries matching a configured key
    Match {
        #[serde(default)]
        entries: IndexMap<String, Vec<String>>,
    },

    /// Enumerate exactly these targets
    Strict {
        #[serde(default)]
        targets: Vec<StrictTarget>,
    },
}

impl InclusionConfig {
    /// Load a policy from a YAML or JSON file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse a policy from YAML (JSON is accepted as well)
    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::Open);
        }
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }
}

/// One explicit `(repository, version)` pair of a strict policy
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StrictTarget {
    /// `project/repository`
    pub repository: String,
    pub version: String,
}

impl StrictTarget {
    pub fn new(repository: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            version: version.into(),
        }
    }

    /// Split `project/repo/sub` into `("project", "repo/sub")`
    pub fn split(&self) -> Result<(&str, &str)> {
        match self.repository.split_once('/') {
            Some((project, repo)) if !project.is_empty() && !repo.is_empty() => {
                Ok((project, repo))
            }
            _ => Err(CoreError::InvalidTarget {
                repository: self.repository.clone(),
            }),
        }
    }
}

/// Which mode a policy runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    Open,
    Match,
    Strict,
}

#[derive(Debug, Clone)]
struct MatchRule {
    key: String,
    pattern: Option<Regex>,
    tags: Vec<String>,
}

impl MatchRule {
    fn matches(&self, candidate: &str) -> bool {
        self.key == candidate
            || self
                .pattern
                .as_ref()
                .is_some_and(|pattern| pattern.is_match(candidate))
    }
}

/// Compiled inclusion policy
#[derive(Debug, Clone)]
pub struct InclusionPolicy {
    mode: PolicyMode,
    rules: Vec<MatchRule>,
    targets: Vec<StrictTarget>,
}

impl Default for InclusionPolicy {
    fn default() -> Self {
        Self::new(InclusionConfig::Open)
    }
}

impl InclusionPolicy {
    /// Compile a policy. Keys that are not valid regular expressions only ever
    /// match a candidate with exactly the same name.
    pub fn new(config: InclusionConfig) -> Self {
        match config {
            InclusionConfig::Open => Self {
                mode: PolicyMode::Open,
                rules: Vec::new(),
                targets: Vec::new(),
            },
            // An empty table configures nothing
            InclusionConfig::Match { entries } if entries.is_empty() => Self::default(),
            InclusionConfig::Match { entries } => {
                let rules = entries
                    .into_iter()
                    .map(|(key, tags)| {
                        let pattern = match Regex::new(&key) {
                            Ok(pattern) => Some(pattern),
                            Err(e) => {
                                tracing::warn!(key = %key, error = %e, "inclusion key is not a valid regex, using exact match only");
                                None
                            }
                        };
                        MatchRule { key, pattern, tags }
                    })
                    .collect();
                Self {
                    mode: PolicyMode::Match,
                    rules,
                    targets: Vec::new(),
                }
            }
            InclusionConfig::Strict { targets } => Self {
                mode: PolicyMode::Strict,
                rules: Vec::new(),
                targets,
            },
        }
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    /// True iff neither a match table nor a strict list is configured
    pub fn is_open(&self) -> bool {
        self.mode == PolicyMode::Open
    }

    /// Map each eligible candidate to the tags to enumerate (empty = all tags).
    ///
    /// In match mode the first configured key that matches a candidate wins and
    /// a candidate matches at most one key. Open mode admits every candidate
    /// with all tags; strict mode admits none.
    pub fn match_candidates<I, S>(&self, candidates: I) -> IndexMap<String, Vec<String>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut matched = IndexMap::new();
        for candidate in candidates {
            let candidate = candidate.as_ref();
            match self.mode {
                PolicyMode::Open => {
                    matched.insert(candidate.to_string(), Vec::new());
                }
                PolicyMode::Match => {
                    if let Some(rule) = self.rules.iter().find(|rule| rule.matches(candidate)) {
                        matched.insert(candidate.to_string(), rule.tags.clone());
                    }
                }
                PolicyMode::Strict => {}
            }
        }
        matched
    }

    /// Configured match keys with their tag lists, in configuration order
    pub fn match_table(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.rules
            .iter()
            .map(|rule| (rule.key.as_str(), rule.tags.as_slice()))
    }

    /// Explicit targets of a strict policy
    pub fn strict_targets(&self) -> &[StrictTarget] {
        &self.targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn match_policy(entries: &[(&str, &[&str])]) -> InclusionPolicy {
        let entries = entries
            .iter()
            .map(|(k, tags)| {
                (
                    k.to_string(),
                    tags.iter().map(|t| t.to_string()).collect::<Vec<_>>(),
                )
            })
            .collect();
        InclusionPolicy::new(InclusionConfig::Match { entries })
    }

    #[test]
    fn test_open_by_default() {
        let policy = InclusionPolicy::default();
        assert!(policy.is_open());
        let matched = policy.match_candidates(["a/b", "c/d"]);
        assert_eq!(matched.len(), 2);
        assert!(matched["a/b"].is_empty());
    }

    #[test]
    fn test_empty_match_table_is_open() {
        let policy = match_policy(&[]);
        assert!(policy.is_open());
    }

    #[test]
    fn test_regex_key_matches() {
        let policy = match_policy(&[("^test/chart-.*$", &["v1"])]);
        assert_eq!(policy.mode(), PolicyMode::Match);

        let matched = policy.match_candidates(["test/chart-xyz", "other/chart-xyz"]);
        assert_eq!(matched.len(), 1);
        assert_eq!(matched["test/chart-xyz"], vec!["v1".to_string()]);
        assert!(!matched.contains_key("other/chart-xyz"));
    }

    #[test]
    fn test_first_key_wins() {
        let policy = match_policy(&[("^proj/.*$", &["v1"]), ("proj/chart-abc", &["v2"])]);
        let matched = policy.match_candidates(["proj/chart-abc"]);
        assert_eq!(matched["proj/chart-abc"], vec!["v1".to_string()]);
    }

    #[test]
    fn test_exact_key_and_empty_tags() {
        let policy = match_policy(&[("proj/chart-abc", &[])]);
        let matched = policy.match_candidates(["proj/chart-abc", "proj/other"]);
        assert_eq!(matched.len(), 1);
        assert!(matched["proj/chart-abc"].is_empty());
    }

    #[test]
    fn test_invalid_regex_is_no_match() {
        let policy = match_policy(&[("proj/(unclosed", &["v1"]), ("^ok$", &[])]);
        let matched = policy.match_candidates(["proj/unclosed", "ok"]);
        assert_eq!(matched.len(), 1);
        assert!(matched.contains_key("ok"));

        // The literal key still matches itself
        let matched = policy.match_candidates(["proj/(unclosed"]);
        assert_eq!(matched["proj/(unclosed"], vec!["v1".to_string()]);
    }

    #[test]
    fn test_match_table_order() {
        let policy = match_policy(&[("zeta", &[]), ("alpha", &["mychart"])]);
        let keys: Vec<_> = policy.match_table().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["zeta", "alpha"]);
    }

    #[test]
    fn test_strict_targets() {
        let policy = InclusionPolicy::new(InclusionConfig::Strict {
            targets: vec![StrictTarget::new("acp/chart-demo", "2.0.0")],
        });
        assert_eq!(policy.mode(), PolicyMode::Strict);
        assert!(!policy.is_open());
        assert!(policy.match_candidates(["acp/chart-demo"]).is_empty());

        let target = &policy.strict_targets()[0];
        assert_eq!(target.split().unwrap(), ("acp", "chart-demo"));
    }

    #[test]
    fn test_strict_target_split() {
        let nested = StrictTarget::new("acp/charts/demo", "1.0.0");
        assert_eq!(nested.split().unwrap(), ("acp", "charts/demo"));

        assert!(StrictTarget::new("demo", "1.0.0").split().is_err());
        assert!(StrictTarget::new("/demo", "1.0.0").split().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
mode: match
entries:
  "^acp/.*$": ["v1"]
  proj: []
"#;
        let config = InclusionConfig::from_yaml(yaml).unwrap();
        match &config {
            InclusionConfig::Match { entries } => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries.get_index(1).unwrap().0, "proj");
            }
            other => panic!("Expected match config, got {:?}", other),
        }

        let strict = InclusionConfig::from_yaml(
            r#"{"mode": "strict", "targets": [{"repository": "acp/chart-demo", "version": "2.0.0"}]}"#,
        )
        .unwrap();
        assert_eq!(
            strict,
            InclusionConfig::Strict {
                targets: vec![StrictTarget::new("acp/chart-demo", "2.0.0")]
            }
        );

        assert_eq!(InclusionConfig::from_yaml("").unwrap(), InclusionConfig::Open);
        assert_eq!(
            InclusionConfig::from_yaml("mode: open").unwrap(),
            InclusionConfig::Open
        );
        assert!(InclusionConfig::from_yaml("mode: everything").is_err());
    }

    #[test]
    fn test_config_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "mode: strict\ntargets:\n  - repository: a/b\n    version: 1.0.0").unwrap();

        let config = InclusionConfig::load_from(file.path()).unwrap();
        let policy = InclusionPolicy::new(config);
        assert_eq!(policy.strict_targets().len(), 1);
    }
}
