//! Core types for ocichart
//!
//! This crate provides the backend-independent building blocks:
//! - `ChartRecord` / `ChartReference` - chart identity and how to re-fetch it
//! - `Manifest` / `Descriptor` - the parts of an OCI manifest charts care about
//! - `InclusionPolicy` - open, match and strict catalog filtering

pub mod chart;
pub mod error;
pub mod manifest;
pub mod policy;

pub use chart::{ChartRecord, ChartReference, download_url, logical_path, media_types, oci_tag};
pub use error::{CoreError, Result};
pub use manifest::{Descriptor, Manifest, OCI_MANIFEST_MEDIA_TYPE};
pub use policy::{InclusionConfig, InclusionPolicy, PolicyMode, StrictTarget};
