//! CLI error types with exit code handling
//!
//! Engine errors are folded into a handful of user-facing categories, each
//! with its own exit code.

use miette::Diagnostic;
use ocichart_repo::RepoError;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Configuration could not be loaded or is incomplete
    #[error("Configuration error: {message}")]
    #[diagnostic(code(ocichart::cli::config))]
    Config {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The backend failed, timed out or refused the request
    #[error("Backend error: {message}")]
    #[diagnostic(code(ocichart::cli::backend))]
    Backend { message: String },

    /// Chart or version not present in the catalog
    #[error("{message}")]
    #[diagnostic(code(ocichart::cli::not_found))]
    NotFound {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Chart artifact failed re-validation on download
    #[error("Invalid chart artifact: {message}")]
    #[diagnostic(code(ocichart::cli::invalid_artifact))]
    InvalidArtifact { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(ocichart::cli::io))]
    Io { message: String },

    /// Internal error (runtime, unexpected failure)
    #[error("Internal error: {message}")]
    #[diagnostic(code(ocichart::cli::internal))]
    Internal { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config { .. } => exit_codes::CONFIG_ERROR,
            CliError::Backend { .. } => exit_codes::BACKEND_ERROR,
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::InvalidArtifact { .. } => exit_codes::INVALID_ARTIFACT,
            CliError::Io { .. } => exit_codes::IO_ERROR,
            CliError::Internal { .. } => exit_codes::ERROR,
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            help: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        let message = err.to_string();
        match err {
            RepoError::InvalidEndpoint { .. }
            | RepoError::InvalidConfig { .. }
            | RepoError::Core(_) => CliError::Config {
                message,
                help: None,
            },
            RepoError::ChartNotFound { .. } => CliError::NotFound {
                message,
                help: Some("Run `ocichart index` to list the charts the catalog can see".to_string()),
            },
            RepoError::InvalidArtifact { .. } => CliError::InvalidArtifact { message },
            RepoError::Io(_) => CliError::Io { message },
            _ => CliError::Backend { message },
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
