//! Command-line overrides layered over the configuration file

use clap::Args;
use ocichart_core::InclusionConfig;
use ocichart_repo::{Endpoint, RepoConfig, Scheme};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{CliError, Result};

/// Backend settings shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct BackendArgs {
    /// Configuration file (YAML)
    #[arg(short, long, global = true, env = "OCICHART_CONFIG")]
    pub config: Option<PathBuf>,

    /// Registry or Harbor host, optionally prefixed by http:// or https://
    #[arg(long, global = true, env = "OCICHART_URL")]
    pub url: Option<String>,

    /// Force the scheme instead of probing https then http
    #[arg(long, global = true, env = "OCICHART_SCHEME")]
    pub scheme: Option<Scheme>,

    #[arg(long, global = true, env = "OCICHART_USERNAME")]
    pub username: Option<String>,

    #[arg(long, global = true, env = "OCICHART_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Docker config.json used when no username/password is given
    #[arg(long, global = true, env = "DOCKER_CONFIG_JSON")]
    pub docker_config: Option<PathBuf>,

    /// Accept self-signed backend certificates
    #[arg(long, global = true)]
    pub insecure_skip_tls: bool,

    /// Inclusion policy file (YAML or JSON); replaces the config file's policy
    #[arg(long, global = true, env = "OCICHART_POLICY")]
    pub policy: Option<PathBuf>,

    /// Per-request timeout in seconds
    #[arg(long, global = true, env = "OCICHART_TIMEOUT")]
    pub timeout: Option<u64>,
}

impl BackendArgs {
    /// Load the configuration file, if any, and apply flag overrides
    pub fn resolve(&self) -> Result<RepoConfig> {
        let mut config = match &self.config {
            Some(path) => RepoConfig::load_from(path).map_err(|e| {
                CliError::config(format!("failed to load {}: {}", path.display(), e))
            })?,
            None => {
                let url = self.url.as_deref().ok_or_else(|| {
                    CliError::config_with_help(
                        "no backend configured",
                        "Pass --url <host> or --config <file>",
                    )
                })?;
                RepoConfig::new(Endpoint::new(url))
            }
        };

        if let Some(url) = &self.url {
            config.endpoint.url = url.clone();
        }
        if self.scheme.is_some() {
            config.endpoint.scheme = self.scheme;
        }
        if let Some(username) = &self.username {
            config.endpoint.username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            config.endpoint.password = Some(password.clone());
        }
        if self.insecure_skip_tls {
            config.endpoint.insecure_skip_tls = true;
        }
        if let Some(path) = &self.docker_config {
            config.docker_config = Some(path.clone());
        }
        if let Some(seconds) = self.timeout {
            if seconds == 0 {
                return Err(CliError::config("--timeout must be at least 1 second"));
            }
            config.request_timeout = Duration::from_secs(seconds);
        }
        if let Some(path) = &self.policy {
            config.inclusion = InclusionConfig::load_from(path).map_err(|e| {
                CliError::config(format!("failed to load policy {}: {}", path.display(), e))
            })?;
        }

        config.endpoint.host()?;
        Ok(config)
    }
}
