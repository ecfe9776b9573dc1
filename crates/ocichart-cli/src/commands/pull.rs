//! Pull command - download a chart archive through the catalog

use ocichart_core::logical_path;
use ocichart_repo::ChartService;
use std::path::{Path, PathBuf};

use crate::error::{CliError, Result};
use crate::settings::BackendArgs;

pub async fn run(
    backend: &BackendArgs,
    chart_ref: &str,
    version: Option<&str>,
    output: Option<&Path>,
    untar: bool,
) -> Result<()> {
    let (name, version) = parse_chart_ref(chart_ref, version)?;

    let config = backend.resolve()?;
    let service = ChartService::connect(&config).await?;
    service.refresh().await?;

    let index = service.index();
    let entry = match &version {
        Some(version) => index.get_version(&name, version),
        None => index.get_latest(&name),
    }
    .ok_or_else(|| {
        let wanted = match &version {
            Some(version) => format!("{}:{}", name, version),
            None => name.clone(),
        };
        CliError::not_found(format!("Chart '{}' not found in the catalog", wanted))
    })?;

    let path = logical_path(&entry.name, &entry.version);
    tracing::info!(chart = %entry.name, version = %entry.version, "pulling chart");
    let data = service.chart(&path).await?;

    let output_path = match output {
        Some(output) => output.to_path_buf(),
        None if untar => PathBuf::from(&entry.name),
        None => PathBuf::from(&path),
    };

    if untar {
        extract_archive(&data, &output_path)?;
        println!("Extracted {} to {}/", path, output_path.display());
    } else {
        std::fs::write(&output_path, &data)?;
        println!("Saved {} ({} bytes)", output_path.display(), data.len());
    }

    Ok(())
}

/// Split `name[:version]`; an explicit `--version` wins over the suffix
fn parse_chart_ref(chart_ref: &str, version_flag: Option<&str>) -> Result<(String, Option<String>)> {
    let (name, version) = match chart_ref.rsplit_once(':') {
        Some((name, version)) => (name, Some(version.to_string())),
        None => (chart_ref, None),
    };

    if name.is_empty() || name.contains('/') {
        return Err(CliError::config_with_help(
            format!("invalid chart reference '{}'", chart_ref),
            "Use the chart name as listed in the index, e.g. mychart or mychart:1.0.0",
        ));
    }

    let version = version_flag.map(String::from).or(version);
    Ok((name.to_string(), version.filter(|v| !v.is_empty())))
}

fn extract_archive(data: &[u8], dest: &Path) -> Result<()> {
    use flate2::read::GzDecoder;
    use tar::Archive;

    std::fs::create_dir_all(dest)?;
    let mut archive = Archive::new(GzDecoder::new(data));
    archive
        .unpack(dest)
        .map_err(|e| CliError::InvalidArtifact {
            message: format!("failed to extract chart archive: {}", e),
        })?;

    Ok(())
}
