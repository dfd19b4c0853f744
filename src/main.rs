//! Fleet Anomaly Predictor - Main Entry Point
//!
//! Consumes telemetry from NATS, scores each event, keeps per-vehicle
//! snapshots in Redis, and serves a status endpoint alongside.

use anyhow::{Context, Result};
use fleet_anomaly_pipeline::{
    broker::nats::{self, NatsSource},
    config::AppConfig,
    consumer::{Scorer, ScorerSettings},
    logging,
    metrics::{MetricsReporter, PipelineMetrics},
    models::InferenceEngine,
    shutdown,
    status::{self, StatusState},
    store::{RedisStateStore, StateStore},
};
use std::sync::Arc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    logging::init(&config.logging, &["fleet_anomaly_pipeline"])?;

    info!("Starting Fleet Anomaly Predictor");
    info!(
        threshold = config.detection.threshold,
        ttl_secs = config.store.ttl_secs,
        topic = %config.broker.topic,
        "Configuration loaded"
    );

    // Trained artifacts: missing or mismatched is fatal
    let engine = Arc::new(InferenceEngine::load(&config)?);
    info!(model = %engine.model_name(), "Model loaded - ready for real-time predictions");

    let client = nats::connect(&config.broker.url).await?;
    let source = NatsSource::subscribe(&client, &config.broker.topic, &config.broker.consumer_group).await?;

    let store: Arc<dyn StateStore> = Arc::new(
        RedisStateStore::connect(&config.store.url)
            .await
            .context("Failed to connect to the state store")?,
    );

    let metrics = Arc::new(PipelineMetrics::new());
    let (trigger, shutdown) = shutdown::channel();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        }
        trigger.trigger();
    });

    let reporter = MetricsReporter::new(metrics.clone(), config.status.report_interval_secs);
    let reporter_task = tokio::spawn(reporter.start(shutdown.clone()));

    let scorer = Scorer::new(
        source,
        engine.clone(),
        store,
        metrics.clone(),
        ScorerSettings::from_config(&config),
    );
    let scorer_task = tokio::spawn(scorer.run(shutdown.clone()));

    let state = StatusState::new(metrics.clone(), engine.model_name());
    let bind_addr = config.status.bind_addr.clone();
    let status_task = tokio::spawn(async move { status::serve(&bind_addr, state, shutdown).await });

    let (scorer_result, status_result) = tokio::join!(scorer_task, status_task);
    scorer_result.context("Scorer task panicked")?;
    match status_result.context("Status task panicked")? {
        Ok(()) => {}
        Err(e) => error!(error = %format!("{e:#}"), "Status endpoint exited with an error"),
    }
    let _ = reporter_task.await;

    info!("Pipeline shutting down...");
    metrics.print_summary();

    Ok(())
}
