//! Telematics Replicator
//!
//! Replays the labeled telemetry dataset onto the broker as an endless live
//! feed, keyed by vehicle.

use anyhow::Result;
use fleet_anomaly_pipeline::{
    broker::nats::{self, NatsPublisher},
    config::AppConfig,
    dataset::VehicleDataset,
    logging,
    producer::EventReplicator,
    shutdown,
};
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;
    logging::init(&config.logging, &["telematics_replicator", "fleet_anomaly_pipeline"])?;

    info!("Starting Telematics Replicator");

    let replay = &config.replicator;
    if replay.startup_delay_secs > 0 {
        info!(seconds = replay.startup_delay_secs, "Waiting for the broker to be ready");
        tokio::time::sleep(Duration::from_secs(replay.startup_delay_secs)).await;
    }

    // A missing dataset halts the replay instead of publishing nothing
    let dataset = match VehicleDataset::load(&replay.dataset_path, &replay.id_column, replay.narrow_floats) {
        Ok(dataset) => dataset,
        Err(e) => {
            error!(path = %replay.dataset_path, error = %format!("{e:#}"), "Cannot start replay");
            return Err(e);
        }
    };

    let client = nats::connect(&config.broker.url).await?;
    let replicator = EventReplicator::new(
        NatsPublisher::new(client),
        dataset,
        &config.broker.topic,
        config.replay_interval(),
    );

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

    let totals = replicator.run(shutdown, None).await;
    info!(
        cycles = totals.cycles_completed,
        published = totals.published,
        failed = totals.failed,
        "Replicator finished"
    );

    Ok(())
}
