//! Catalog engine for ocichart
//!
//! Exposes an OCI registry or Harbor instance as a Helm chart repository:
//!
//! - **Catalog passes**: walk the backend under an inclusion policy and
//!   record every chart-shaped artifact
//! - **Index**: render the cached records as a Helm `index.yaml`
//! - **Retrieval**: re-pull and re-check a chart's manifest, then return its
//!   single content layer
//!
//! ## Example
//!
//! ```rust,no_run
//! use ocichart_repo::{ChartService, Endpoint, RepoConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RepoConfig::new(Endpoint::new("harbor.example.com"));
//! let service = ChartService::connect(&config).await?;
//!
//! let summary = service.refresh().await?;
//! println!("{} charts", summary.records);
//!
//! let index = service.index_yaml()?;
//! let archive = service.chart("mychart-1.0.0.tgz").await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Security Notes
//!
//! - Credentials are NEVER sent after cross-origin redirects
//! - Downloaded layers are checked against the manifest's size and digest

pub mod builder;
pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod harbor;
pub mod http;
pub mod index;
pub mod oci;
pub mod registry;
pub mod retriever;
pub mod service;
pub mod source;
pub mod validator;

// Re-exports for convenience
pub use builder::{CatalogBuilder, PassSummary};
pub use cache::CatalogCache;
pub use config::{Endpoint, RepoConfig, Scheme};
pub use credentials::{Credentials, DockerConfig};
pub use error::{ErrorClass, RepoError, Result};
pub use harbor::HarborClient;
pub use http::ApiClient;
pub use index::{ChartEntry, ChartIndex};
pub use oci::{OciClient, OciTransport};
pub use registry::RegistryClient;
pub use retriever::ArtifactRetriever;
pub use service::ChartService;
pub use source::{CatalogSource, SourceKind};
pub use validator::ManifestValidator;
