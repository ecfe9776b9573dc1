//! Error types for catalog and retrieval operations

use ocichart_core::CoreError;
use thiserror::Error;

/// Timeout reported when the underlying client does not say which limit fired
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Catalog engine errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Configuration Errors ============
    #[error("Invalid endpoint URL: {url} - {reason}")]
    InvalidEndpoint { url: String, reason: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    // ============ Network Errors ============
    #[error("HTTP error: {status} - {message}")]
    HttpError { status: u16, message: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timeout after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Rate limited by server. Retry after {retry_after} seconds")]
    RateLimited { retry_after: u64 },

    // ============ Authorization / Policy Errors ============
    #[error("Authentication required for {url}")]
    AuthRequired { url: String },

    #[error("Authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("Registry refused request ({status} {code}): {message}")]
    Denied {
        status: u16,
        code: String,
        message: String,
    },

    // ============ Chart Validation Errors ============
    #[error("{reference} is not a chart (config media type '{media_type}')")]
    NotAChart {
        reference: String,
        media_type: String,
    },

    #[error("Malformed chart artifact {reference}: {message}")]
    Malformed { reference: String, message: String },

    // ============ Retrieval Errors ============
    #[error("Chart not found: {path}")]
    ChartNotFound { path: String },

    #[error("Invalid chart artifact {reference}: {message}")]
    InvalidArtifact { reference: String, message: String },

    // ============ OCI Errors ============
    #[error("OCI registry error: {message}")]
    OciError { message: String },

    #[error("Invalid OCI reference: {reference}")]
    InvalidOciReference { reference: String },

    // ============ Other ============
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, RepoError>;

/// How a catalog walk reacts to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The backend could not be reached; abort the walk
    Transport,
    /// Authorization or policy refusal; skip the candidate and continue
    SkipCandidate,
    /// The artifact exists but is not a valid chart; skip it
    Malformed,
}

impl RepoError {
    /// Classify this error for the catalog walk
    pub fn class(&self) -> ErrorClass {
        match self {
            RepoError::HttpError { status, .. } if *status < 500 => ErrorClass::SkipCandidate,
            RepoError::HttpError { .. }
            | RepoError::NetworkError { .. }
            | RepoError::Timeout { .. }
            | RepoError::RateLimited { .. }
            | RepoError::OciError { .. }
            | RepoError::Io(_)
            | RepoError::InvalidEndpoint { .. }
            | RepoError::InvalidConfig { .. } => ErrorClass::Transport,
            RepoError::AuthRequired { .. }
            | RepoError::AuthFailed { .. }
            | RepoError::Denied { .. }
            | RepoError::NotAChart { .. }
            | RepoError::ChartNotFound { .. } => ErrorClass::SkipCandidate,
            RepoError::Malformed { .. }
            | RepoError::InvalidArtifact { .. }
            | RepoError::InvalidOciReference { .. }
            | RepoError::Core(_)
            | RepoError::Serialization(_) => ErrorClass::Malformed,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RepoError::Timeout { .. })
    }

    /// The backend answered that the requested object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RepoError::HttpError { status: 404, .. }
                | RepoError::Denied { status: 404, .. }
                | RepoError::ChartNotFound { .. }
        )
    }

    pub fn malformed(reference: impl Into<String>, message: impl Into<String>) -> Self {
        RepoError::Malformed {
            reference: reference.into(),
            message: message.into(),
        }
    }

    pub fn invalid_artifact(reference: impl Into<String>, message: impl Into<String>) -> Self {
        RepoError::InvalidArtifact {
            reference: reference.into(),
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RepoError::Timeout {
                seconds: DEFAULT_TIMEOUT_SECS,
            }
        } else if e.is_connect() {
            RepoError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            RepoError::HttpError {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            RepoError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidEndpoint {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}
