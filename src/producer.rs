//! Event replicator: replays the dataset as an endless keyed stream

use crate::broker::MessagePublisher;
use crate::dataset::VehicleDataset;
use crate::shutdown::Shutdown;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Counts for one pass over the dataset
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    pub published: u64,
    pub failed: u64,
    /// Shutdown arrived before the pass finished
    pub interrupted: bool,
}

/// Totals across passes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub cycles_completed: u64,
    pub published: u64,
    pub failed: u64,
}

/// Publishes every row keyed by vehicle, one vehicle group after another,
/// pausing `interval` after each row, and starts over when done.
pub struct EventReplicator<P> {
    publisher: P,
    dataset: VehicleDataset,
    topic: String,
    interval: Duration,
}

impl<P: MessagePublisher> EventReplicator<P> {
    pub fn new(publisher: P, dataset: VehicleDataset, topic: &str, interval: Duration) -> Self {
        Self {
            publisher,
            dataset,
            topic: topic.to_string(),
            interval,
        }
    }

    pub fn dataset(&self) -> &VehicleDataset {
        &self.dataset
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// One full pass: all groups in order, rows in file order.
    ///
    /// A row that fails to serialize or publish is logged and skipped.
    pub async fn run_cycle(&self, shutdown: &mut Shutdown) -> CycleStats {
        let mut stats = CycleStats::default();

        for group in self.dataset.groups() {
            for row in &group.rows {
                if shutdown.is_requested() {
                    stats.interrupted = true;
                    return stats;
                }

                let published = match self.dataset.payload(row) {
                    Ok(payload) => self
                        .publisher
                        .publish(&self.topic, &group.vehicle_id, payload)
                        .await
                        .map_err(|e| e.to_string()),
                    Err(e) => Err(format!("serialization failed: {e}")),
                };

                match published {
                    Ok(()) => stats.published += 1,
                    Err(reason) => {
                        stats.failed += 1;
                        warn!(
                            vehicle_id = %group.vehicle_id,
                            topic = %self.topic,
                            error = %reason,
                            "Failed to publish telemetry event"
                        );
                    }
                }

                if !self.pace(shutdown).await {
                    stats.interrupted = true;
                    return stats;
                }
            }
        }

        stats
    }

    /// Replay until shutdown, or until `max_cycles` passes have completed
    pub async fn run(&self, mut shutdown: Shutdown, max_cycles: Option<u64>) -> ReplayStats {
        let mut totals = ReplayStats::default();
        info!(
            topic = %self.topic,
            vehicles = self.dataset.vehicle_count(),
            rows = self.dataset.row_count(),
            interval_ms = self.interval.as_millis() as u64,
            "Starting continuous telematics replay"
        );

        loop {
            let cycle = self.run_cycle(&mut shutdown).await;
            totals.published += cycle.published;
            totals.failed += cycle.failed;

            if let Err(e) = self.publisher.flush().await {
                warn!(error = %e, "Failed to flush publisher");
            }
            if cycle.interrupted {
                break;
            }

            totals.cycles_completed += 1;
            info!(
                cycle = totals.cycles_completed,
                published = cycle.published,
                failed = cycle.failed,
                "Dataset cycle completed for all vehicles, restarting stream"
            );

            if max_cycles.is_some_and(|max| totals.cycles_completed >= max) {
                break;
            }
        }

        info!(
            cycles = totals.cycles_completed,
            published = totals.published,
            failed = totals.failed,
            "Replay stopped"
        );
        totals
    }

    /// Wait out the pacing interval; false when shutdown cut it short
    async fn pace(&self, shutdown: &mut Shutdown) -> bool {
        if self.interval.is_zero() {
            tokio::task::yield_now().await;
            return !shutdown.is_requested();
        }
        tokio::select! {
            _ = tokio::time::sleep(self.interval) => {
                debug!("Pacing interval elapsed");
                true
            }
            _ = shutdown.requested() => false,
        }
    }
}
