//! Index command - run one catalog pass and print the repository index

use ocichart_repo::{ChartIndex, ChartService};
use std::path::Path;

use crate::error::{CliError, Result};
use crate::settings::BackendArgs;

pub async fn run(
    backend: &BackendArgs,
    chart: Option<&str>,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let config = backend.resolve()?;
    let service = ChartService::connect(&config).await?;

    let summary = service.refresh().await?;
    if summary.interrupted {
        tracing::warn!(
            records = summary.records,
            "backend failed during the catalog pass, index is partial"
        );
    }

    let index = service.index();
    if let Some(name) = chart {
        let entry = index.get_latest(name).ok_or_else(|| CliError::NotFound {
            message: format!("Chart '{}' not found in the catalog", name),
            help: Some(available_help(&index)),
        })?;
        println!("{}\t{}\t{}", entry.name, entry.version, entry.digest);
        return Ok(());
    }

    let rendered = if json {
        serde_json::to_string_pretty(&index)
            .map_err(|e| CliError::internal(format!("failed to render index: {}", e)))?
    } else {
        index.to_yaml()?
    };

    match output {
        Some(path) => {
            std::fs::write(path, rendered)?;
            eprintln!(
                "Wrote {} chart(s) to {}",
                index.len(),
                path.display()
            );
        }
        None => print!("{}", rendered),
    }

    Ok(())
}

fn available_help(index: &ChartIndex) -> String {
    let names = index.names();
    if names.is_empty() {
        "The catalog is empty; check the inclusion policy and credentials".to_string()
    } else {
        format!("Available charts: {}", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocichart_core::ChartRecord;

    #[test]
    fn test_available_help() {
        assert!(available_help(&ChartIndex::default()).contains("empty"));

        let record =
            ChartRecord::from_config(br#"{"name": "app", "version": "1.0.0"}"#, "sha256:a").unwrap();
        let index = ChartIndex::from_records(vec![record]);
        assert_eq!(available_help(&index), "Available charts: app");
    }
}
