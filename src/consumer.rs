//! Scorer: the consumer loop that classifies telemetry and projects snapshots.
//!
//! Each iteration polls once with a bounded timeout, then runs decode,
//! feature assembly, inference, store write and alerting to completion.
//! Any failure drops only the message at hand.

use crate::broker::{BrokerMessage, MessageSource, PollOutcome};
use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::metrics::PipelineMetrics;
use crate::models::InferenceEngine;
use crate::shutdown::Shutdown;
use crate::store::StateStore;
use crate::types::{AnomalyAlert, ScoringResult, TelemetryEvent, VehicleSnapshot};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Log target of anomaly alerts
pub const ALERT_TARGET: &str = "fleet_anomaly_pipeline::alert";

/// Tunables of the scoring loop
#[derive(Debug, Clone)]
pub struct ScorerSettings {
    pub key_prefix: String,
    pub snapshot_ttl: Duration,
    pub poll_timeout: Duration,
    pub alert_field: String,
}

impl ScorerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            key_prefix: config.store.key_prefix.clone(),
            snapshot_ttl: config.snapshot_ttl(),
            poll_timeout: config.poll_timeout(),
            alert_field: config.detection.alert_field.clone(),
        }
    }
}

impl Default for ScorerSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

/// What one loop iteration did
#[derive(Debug)]
pub enum StepOutcome {
    /// Poll timed out with nothing to do
    Idle,
    EndOfPartition { partition: usize },
    Scored(ScoringResult),
    /// The message (or poll) failed and was dropped
    Dropped(PipelineError),
}

/// Counts from draining whatever is currently available
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainStats {
    pub scored: u64,
    pub dropped: u64,
}

pub struct Scorer<S> {
    source: S,
    engine: Arc<InferenceEngine>,
    store: Arc<dyn StateStore>,
    metrics: Arc<PipelineMetrics>,
    settings: ScorerSettings,
}

impl<S: MessageSource> Scorer<S> {
    pub fn new(
        source: S,
        engine: Arc<InferenceEngine>,
        store: Arc<dyn StateStore>,
        metrics: Arc<PipelineMetrics>,
        settings: ScorerSettings,
    ) -> Self {
        Self {
            source,
            engine,
            store,
            metrics,
            settings,
        }
    }

    /// Poll until shutdown. The poll timeout bounds how long a request waits.
    pub async fn run(mut self, shutdown: Shutdown) {
        info!(
            model = %self.engine.model_name(),
            features = self.engine.schema().feature_count(),
            ttl_secs = self.settings.snapshot_ttl.as_secs(),
            "Scorer started"
        );

        while !shutdown.is_requested() {
            self.poll_once().await;
        }

        info!("Scorer stopped");
    }

    /// Process everything available until a poll times out
    pub async fn drain(&mut self) -> DrainStats {
        let mut stats = DrainStats::default();
        loop {
            match self.poll_once().await {
                StepOutcome::Idle => return stats,
                StepOutcome::EndOfPartition { .. } => {}
                StepOutcome::Scored(_) => stats.scored += 1,
                StepOutcome::Dropped(_) => stats.dropped += 1,
            }
        }
    }

    /// One iteration: poll, then fully handle whatever arrived
    pub async fn poll_once(&mut self) -> StepOutcome {
        match self.source.poll(self.settings.poll_timeout).await {
            Ok(PollOutcome::Timeout) => StepOutcome::Idle,
            Ok(PollOutcome::EndOfPartition { partition }) => {
                trace!(partition = partition, "Reached end of partition");
                StepOutcome::EndOfPartition { partition }
            }
            Ok(PollOutcome::Message(message)) => match self.process(&message).await {
                Ok(result) => StepOutcome::Scored(result),
                Err(e) => {
                    self.report(&e, &message);
                    StepOutcome::Dropped(e)
                }
            },
            Err(e) => {
                let e = PipelineError::from(e);
                error!(error = %e, "Broker poll failed");
                self.metrics.record_failure(e.kind());
                StepOutcome::Dropped(e)
            }
        }
    }

    /// Score one message and project the result into the store.
    ///
    /// An alert is raised for a positive verdict even when the store write
    /// fails; the write failure is still returned.
    pub async fn process(&self, message: &BrokerMessage) -> Result<ScoringResult, PipelineError> {
        let started = Instant::now();

        let event = TelemetryEvent::from_slice(&message.payload)?;
        if let Some(key) = message.key.as_deref() {
            if key != event.vehicle_id() {
                debug!(key = %key, vehicle_id = %event.vehicle_id(), "Message key differs from payload identity");
            }
        }

        let result = self.engine.score(&event)?;

        let snapshot = VehicleSnapshot::project(&event, &result, &self.settings.key_prefix);
        let stored = self
            .store
            .put_snapshot(&snapshot, self.settings.snapshot_ttl)
            .await;

        if result.is_anomaly {
            self.raise_alert(&event, &result);
        }

        self.metrics.record_event(
            event.vehicle_id(),
            started.elapsed(),
            result.anomaly_probability,
        );
        stored?;

        debug!(
            key = %snapshot.key(),
            anomaly_score = result.anomaly_probability,
            is_anomaly = result.is_anomaly,
            "Snapshot updated"
        );
        Ok(result)
    }

    fn raise_alert(&self, event: &TelemetryEvent, result: &ScoringResult) {
        let alert = AnomalyAlert::new(event, result, &self.settings.alert_field);
        self.metrics.record_anomaly();

        warn!(
            target: ALERT_TARGET,
            alert_id = %alert.alert_id,
            vehicle_id = %alert.vehicle_id,
            anomaly_probability = alert.anomaly_probability,
            risk_level = ?alert.risk_level,
            salient_field = %alert.salient_field,
            salient_value = %alert.salient_value.as_deref().unwrap_or("n/a"),
            "ANOMALY detected for vehicle {} (risk {:.1}%)",
            alert.vehicle_id,
            alert.anomaly_probability * 100.0
        );
    }

    fn report(&self, err: &PipelineError, message: &BrokerMessage) {
        self.metrics.record_failure(err.kind());
        let key = message.key.as_deref().unwrap_or("-");

        match err {
            PipelineError::Decode(_) | PipelineError::SchemaMismatch { .. } => {
                warn!(key = %key, kind = err.kind().as_str(), error = %err, "Message skipped");
            }
            PipelineError::Inference(_) | PipelineError::Transport(_) | PipelineError::Store(_) => {
                error!(key = %key, kind = err.kind().as_str(), error = %err, "Message processing failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{BrokerError, MemoryBroker, MessagePublisher};
    use crate::error::FailureKind;
    use crate::feature_extractor::FeatureSchema;
    use crate::models::Classifier;
    use crate::store::{MemoryStateStore, StoreError};
    use async_trait::async_trait;

    /// Probability is the `engine_temp_c` reading divided by 200
    struct TempClassifier;

    impl Classifier for TempClassifier {
        fn name(&self) -> &str {
            "temp"
        }
        fn input_width(&self) -> Option<usize> {
            Some(2)
        }
        fn predict_proba(&self, features: &[f32]) -> anyhow::Result<f64> {
            if features[1] < 0.0 {
                anyhow::bail!("negative temperature");
            }
            Ok(features[1] as f64 / 200.0)
        }
    }

    fn engine() -> Arc<InferenceEngine> {
        Arc::new(
            InferenceEngine::new(
                Box::new(TempClassifier),
                FeatureSchema::new(["speed_kmh", "engine_temp_c"]).unwrap(),
                0.5,
            )
            .unwrap(),
        )
    }

    fn scorer(
        broker: &MemoryBroker,
        store: Arc<dyn StateStore>,
        metrics: Arc<PipelineMetrics>,
    ) -> Scorer<crate::broker::MemorySource> {
        let settings = ScorerSettings {
            poll_timeout: Duration::from_millis(20),
            ..ScorerSettings::default()
        };
        Scorer::new(broker.subscribe("t"), engine(), store, metrics, settings)
    }

    #[tokio::test]
    async fn test_scores_and_projects() {
        let broker = MemoryBroker::new(1);
        let store = Arc::new(MemoryStateStore::new());
        let metrics = Arc::new(PipelineMetrics::new());
        broker
            .publish("t", "5", br#"{"vehicle_id": 5, "speed_kmh": 80.0, "engine_temp_c": 150.0}"#.to_vec())
            .await
            .unwrap();

        let mut scorer = scorer(&broker, store.clone(), metrics.clone());
        let stats = scorer.drain().await;
        assert_eq!(stats, DrainStats { scored: 1, dropped: 0 });

        let snapshot = store.get_snapshot("vehicle:5").await.unwrap().unwrap();
        assert_eq!(snapshot.anomaly_score(), Some(0.75));
        assert_eq!(snapshot.is_anomaly(), Some(true));
        assert_eq!(snapshot.get("speed_kmh"), Some("80.0"));
        assert_eq!(metrics.snapshot().anomalies_detected, 1);
    }

    #[tokio::test]
    async fn test_inference_failure_is_contained() {
        let broker = MemoryBroker::new(1);
        let store = Arc::new(MemoryStateStore::new());
        let metrics = Arc::new(PipelineMetrics::new());
        broker
            .publish("t", "1", br#"{"vehicle_id": 1, "speed_kmh": 1.0, "engine_temp_c": -5.0}"#.to_vec())
            .await
            .unwrap();
        broker
            .publish("t", "2", br#"{"vehicle_id": 2, "speed_kmh": 1.0, "engine_temp_c": 20.0}"#.to_vec())
            .await
            .unwrap();

        let mut scorer = scorer(&broker, store.clone(), metrics.clone());
        let stats = scorer.drain().await;

        assert_eq!(stats, DrainStats { scored: 1, dropped: 1 });
        assert_eq!(metrics.failures(FailureKind::Inference), 1);
        assert!(store.get_snapshot("vehicle:1").await.unwrap().is_none());
        assert!(store.get_snapshot("vehicle:2").await.unwrap().is_some());
    }

    struct FailingSource {
        polls: u32,
    }

    #[async_trait]
    impl MessageSource for FailingSource {
        async fn poll(&mut self, _timeout: Duration) -> Result<PollOutcome, BrokerError> {
            self.polls += 1;
            match self.polls {
                1 => Err(BrokerError::Closed("t".into())),
                2 => Ok(PollOutcome::EndOfPartition { partition: 0 }),
                _ => Ok(PollOutcome::Timeout),
            }
        }
    }

    #[tokio::test]
    async fn test_transport_error_logged_end_of_partition_not() {
        let metrics = Arc::new(PipelineMetrics::new());
        let mut scorer = Scorer::new(
            FailingSource { polls: 0 },
            engine(),
            Arc::new(MemoryStateStore::new()),
            metrics.clone(),
            ScorerSettings::default(),
        );

        assert!(matches!(
            scorer.poll_once().await,
            StepOutcome::Dropped(PipelineError::Transport(_))
        ));
        assert!(matches!(
            scorer.poll_once().await,
            StepOutcome::EndOfPartition { partition: 0 }
        ));
        assert!(matches!(scorer.poll_once().await, StepOutcome::Idle));
        assert_eq!(metrics.failures(FailureKind::Transport), 1);
        assert_eq!(metrics.snapshot().events_scored, 0);
    }

    struct BrokenStore;

    #[async_trait]
    impl StateStore for BrokenStore {
        async fn put_snapshot(&self, _: &VehicleSnapshot, _: Duration) -> Result<(), StoreError> {
            Err(StoreError::Backend("connection reset".into()))
        }
        async fn get_snapshot(&self, _: &str) -> Result<Option<VehicleSnapshot>, StoreError> {
            Ok(None)
        }
        async fn remaining_ttl(&self, _: &str) -> Result<Option<Duration>, StoreError> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_store_failure_still_alerts() {
        let broker = MemoryBroker::new(1);
        let metrics = Arc::new(PipelineMetrics::new());
        broker
            .publish("t", "9", br#"{"vehicle_id": 9, "speed_kmh": 99.0, "engine_temp_c": 190.0}"#.to_vec())
            .await
            .unwrap();

        let mut scorer = scorer(&broker, Arc::new(BrokenStore), metrics.clone());
        let stats = scorer.drain().await;

        assert_eq!(stats.dropped, 1);
        assert_eq!(metrics.failures(FailureKind::Store), 1);
        assert_eq!(metrics.snapshot().anomalies_detected, 1);
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let broker = MemoryBroker::new(1);
        let scorer = scorer(&broker, Arc::new(MemoryStateStore::new()), Arc::new(PipelineMetrics::new()));
        let (trigger, shutdown) = crate::shutdown::channel();

        let handle = tokio::spawn(scorer.run(shutdown));
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("scorer should stop within one poll timeout")
            .unwrap();
    }
}
