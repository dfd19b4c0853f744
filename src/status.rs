//! Read-only status endpoint served next to the scoring loop

use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::shutdown::Shutdown;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct StatusState {
    metrics: Arc<PipelineMetrics>,
    model: Arc<str>,
}

impl StatusState {
    pub fn new(metrics: Arc<PipelineMetrics>, model: &str) -> Self {
        Self {
            metrics,
            model: model.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub message: &'static str,
    pub model: String,
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
}

pub async fn home(State(state): State<StatusState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        message: "Real-time anomaly detection ACTIVE",
        model: state.model.to_string(),
        metrics: state.metrics.snapshot(),
    })
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

pub fn router(state: StatusState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/health", get(health))
        .with_state(state)
}

/// Serve until shutdown is requested
pub async fn serve(bind_addr: &str, state: StatusState, mut shutdown: Shutdown) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind status endpoint on {}", bind_addr))?;
    info!(addr = %bind_addr, "Status endpoint listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.requested().await })
        .await
        .context("Status endpoint failed")?;

    info!("Status endpoint stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_home_reports_counters() {
        let metrics = Arc::new(PipelineMetrics::new());
        metrics.record_event("1", Duration::from_micros(50), 0.9);
        metrics.record_anomaly();

        let Json(body) = home(State(StatusState::new(metrics, "telematics_xgb"))).await;
        assert_eq!(body.metrics.vehicles_monitored, 1);
        assert_eq!(body.metrics.anomalies_detected, 1);

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["message"], "Real-time anomaly detection ACTIVE");
        assert_eq!(json["events_scored"], 1);
        assert_eq!(json["model"], "telematics_xgb");
    }

    #[tokio::test]
    async fn test_health() {
        let Json(body) = health().await;
        assert_eq!(body.status, "healthy");
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let (trigger, shutdown) = crate::shutdown::channel();
        let state = StatusState::new(Arc::new(PipelineMetrics::new()), "m");
        let handle = tokio::spawn(async move { serve("127.0.0.1:0", state, shutdown).await });

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("server should stop")
            .unwrap()
            .unwrap();
    }
}
