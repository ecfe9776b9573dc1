//! Serve command - expose the catalog as a Helm HTTP repository

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use ocichart_repo::{ChartService, RepoError};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

use crate::error::{CliError, Result};
use crate::settings::BackendArgs;

#[derive(Clone)]
pub struct AppState {
    service: Arc<ChartService>,
}

pub async fn run(backend: &BackendArgs, listen: SocketAddr, refresh_secs: Option<u64>) -> Result<()> {
    let config = backend.resolve()?;
    let service = Arc::new(ChartService::connect(&config).await?);

    // A failed startup pass leaves an empty index; the server still starts
    refresh_logged(&service).await;

    let period = refresh_secs
        .map(Duration::from_secs)
        .or(config.refresh_interval)
        .filter(|period| !period.is_zero());
    if let Some(period) = period {
        tracing::info!(interval = ?period, "periodic catalog refresh enabled");
        spawn_refresher(Arc::clone(&service), period);
    }

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| CliError::Io {
            message: format!("failed to bind {}: {}", listen, e),
        })?;
    tracing::info!(
        listen = %listen,
        backend = %service.endpoint(),
        kind = %service.kind(),
        "serving chart repository"
    );

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CliError::internal(format!("server error: {}", e)))?;

    Ok(())
}

pub fn router(service: Arc<ChartService>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/index.yaml", get(index_yaml))
        .route("/charts/:name", get(get_chart))
        .route("/refresh", post(refresh))
        .route("/healthz", get(healthz))
        .with_state(AppState { service })
}

fn spawn_refresher(service: Arc<ChartService>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately and the startup pass already ran
        ticker.tick().await;
        loop {
            ticker.tick().await;
            refresh_logged(&service).await;
        }
    })
}

async fn refresh_logged(service: &ChartService) {
    match service.refresh().await {
        Ok(summary) if summary.interrupted => tracing::warn!(
            records = summary.records,
            skipped = summary.skipped,
            rejected = summary.rejected,
            "catalog pass interrupted by a backend failure"
        ),
        Ok(_) => tracing::debug!(charts = service.chart_count(), "index updated"),
        Err(e) => tracing::warn!(error = %e, "catalog pass failed"),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

/// HTTP status for an engine error
fn status_for(err: &RepoError) -> StatusCode {
    match err {
        RepoError::ChartNotFound { .. } => StatusCode::NOT_FOUND,
        RepoError::InvalidArtifact { .. }
        | RepoError::Malformed { .. }
        | RepoError::NotAChart { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        err if err.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(err: RepoError) -> Response {
    let status = status_for(&err);
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

async fn root(State(state): State<AppState>) -> String {
    format!(
        "ocichart: {} charts from {} ({})\n",
        state.service.chart_count(),
        state.service.endpoint(),
        state.service.kind()
    )
}

async fn index_yaml(State(state): State<AppState>) -> Response {
    match state.service.index_yaml() {
        Ok(yaml) => ([(header::CONTENT_TYPE, "application/x-yaml")], yaml).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to render index");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn get_chart(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    match state.service.chart(&name).await {
        Ok(bytes) => (
            [
                (header::CONTENT_TYPE, "application/x-tar".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", name),
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!(chart = %name, error = %e, "chart download failed");
            error_response(e)
        }
    }
}

async fn refresh(State(state): State<AppState>) -> Response {
    match state.service.refresh().await {
        Ok(summary) => Json(summary).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "manual catalog pass failed");
            error_response(e)
        }
    }
}

async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "charts": state.service.chart_count(),
        "lastRefresh": state.service.last_refresh(),
    }))
}
