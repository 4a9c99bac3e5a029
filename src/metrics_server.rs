//! Prometheus metrics and health checks over HTTP.

use std::convert::Infallible;
use std::sync::Arc;

use tracing::info;
use warp::Filter;

use crate::{
    gemini::GeminiClient, health::HealthChecker, metrics::MetricsRegistry,
    sync_state::SyncStateFile,
};

/// Everything the `/health` route probes.
pub struct HealthTargets {
    pub checker: Arc<HealthChecker>,
    pub gemini: Arc<GeminiClient>,
    pub sync_state: SyncStateFile,
}

pub async fn serve(port: u16, metrics: Arc<MetricsRegistry>, health: Arc<HealthTargets>) {
    info!("Starting metrics server on port {}...", port);
    warp::serve(routes(metrics, health))
        .run(([0, 0, 0, 0], port))
        .await;
}

pub fn routes(
    metrics: Arc<MetricsRegistry>,
    health: Arc<HealthTargets>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let metrics_route = warp::path("metrics")
        .and(warp::get())
        .and(with_shared(metrics))
        .and_then(handle_metrics);

    let health_route = warp::path("health")
        .and(warp::get())
        .and(with_shared(health))
        .and_then(handle_health);

    let root_route = warp::path::end()
        .and(warp::get())
        .map(|| "kbrelay - /metrics, /health");

    metrics_route.or(health_route).or(root_route)
}

fn with_shared<T: Send + Sync + 'static>(
    value: Arc<T>,
) -> impl Filter<Extract = (Arc<T>,), Error = Infallible> + Clone {
    warp::any().map(move || value.clone())
}

async fn handle_metrics(metrics: Arc<MetricsRegistry>) -> Result<impl warp::Reply, warp::Rejection> {
    Ok(warp::reply::with_header(
        metrics.gather_metrics(),
        "Content-Type",
        "text/plain; version=0.0.4; charset=utf-8",
    ))
}

async fn handle_health(health: Arc<HealthTargets>) -> Result<impl warp::Reply, warp::Rejection> {
    let status = health
        .checker
        .get_overall_health(&health.gemini, &health.sync_state)
        .await;

    let json_response = serde_json::to_string_pretty(&status)
        .unwrap_or_else(|_| "{\"error\": \"Failed to serialize health status\"}".to_string());

    Ok(warp::reply::with_header(
        json_response,
        "Content-Type",
        "application/json",
    ))
}
