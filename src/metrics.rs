//! Performance metrics and statistics tracking for the scoring loop.

use crate::error::FailureKind;
use crate::shutdown::Shutdown;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for the scorer
pub struct PipelineMetrics {
    /// Events scored (and projected)
    pub events_scored: AtomicU64,
    /// Positive verdicts, one alert each
    pub anomalies_detected: AtomicU64,
    decode_failures: AtomicU64,
    schema_mismatches: AtomicU64,
    inference_failures: AtomicU64,
    transport_errors: AtomicU64,
    store_failures: AtomicU64,
    /// Distinct vehicles seen since start
    vehicles: RwLock<HashSet<String>>,
    /// Processing times (in microseconds)
    processing_times: RwLock<Vec<u64>>,
    /// Anomaly probability distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            events_scored: AtomicU64::new(0),
            anomalies_detected: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            schema_mismatches: AtomicU64::new(0),
            inference_failures: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            store_failures: AtomicU64::new(0),
            vehicles: RwLock::new(HashSet::new()),
            processing_times: RwLock::new(Vec::with_capacity(1000)),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record a scored event
    pub fn record_event(&self, vehicle_id: &str, processing_time: Duration, probability: f64) {
        self.events_scored.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut vehicles) = self.vehicles.write() {
            if !vehicles.contains(vehicle_id) {
                vehicles.insert(vehicle_id.to_string());
            }
        }

        if let Ok(mut times) = self.processing_times.write() {
            times.push(processing_time.as_micros() as u64);
            // Keep only last 10000 for memory efficiency
            if times.len() > 10000 {
                times.drain(0..5000);
            }
        }

        let bucket = (probability.clamp(0.0, 1.0) * 10.0).min(9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    pub fn record_anomaly(&self) {
        self.anomalies_detected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, kind: FailureKind) {
        self.failure_counter(kind).fetch_add(1, Ordering::Relaxed);
    }

    pub fn failures(&self, kind: FailureKind) -> u64 {
        self.failure_counter(kind).load(Ordering::Relaxed)
    }

    fn failure_counter(&self, kind: FailureKind) -> &AtomicU64 {
        match kind {
            FailureKind::Decode => &self.decode_failures,
            FailureKind::SchemaMismatch => &self.schema_mismatches,
            FailureKind::Inference => &self.inference_failures,
            FailureKind::Transport => &self.transport_errors,
            FailureKind::Store => &self.store_failures,
        }
    }

    pub fn vehicles_seen(&self) -> usize {
        self.vehicles.read().map(|v| v.len()).unwrap_or(0)
    }

    /// Get processing time statistics
    pub fn get_processing_stats(&self) -> ProcessingStats {
        let Ok(times) = self.processing_times.read() else {
            return ProcessingStats::default();
        };
        if times.is_empty() {
            return ProcessingStats::default();
        }

        let mut sorted: Vec<u64> = times.clone();
        sorted.sort_unstable();

        let sum: u64 = sorted.iter().sum();
        let count = sorted.len();

        ProcessingStats {
            count: count as u64,
            mean_us: sum / count as u64,
            p50_us: sorted[count / 2],
            p95_us: sorted[((count as f64 * 0.95) as usize).min(count - 1)],
            p99_us: sorted[((count as f64 * 0.99) as usize).min(count - 1)],
            max_us: sorted[count - 1],
        }
    }

    /// Current throughput (events per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.events_scored.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn get_score_distribution(&self) -> [u64; 10] {
        self.score_buckets.read().map(|b| *b).unwrap_or([0; 10])
    }

    /// Point-in-time view, as served by the status endpoint
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            vehicles_monitored: self.vehicles_seen(),
            events_scored: self.events_scored.load(Ordering::Relaxed),
            anomalies_detected: self.anomalies_detected.load(Ordering::Relaxed),
            decode_failures: self.failures(FailureKind::Decode),
            schema_mismatches: self.failures(FailureKind::SchemaMismatch),
            inference_failures: self.failures(FailureKind::Inference),
            transport_errors: self.failures(FailureKind::Transport),
            store_failures: self.failures(FailureKind::Store),
            uptime_secs: self.start_time.elapsed().as_secs(),
        }
    }

    /// Print summary statistics
    pub fn print_summary(&self) {
        let snapshot = self.snapshot();
        let anomaly_rate = if snapshot.events_scored > 0 {
            (snapshot.anomalies_detected as f64 / snapshot.events_scored as f64) * 100.0
        } else {
            0.0
        };
        let processing = self.get_processing_stats();

        info!(
            events_scored = snapshot.events_scored,
            vehicles = snapshot.vehicles_monitored,
            throughput = format!("{:.1} ev/s", self.get_throughput()),
            anomalies = snapshot.anomalies_detected,
            anomaly_rate = format!("{:.1}%", anomaly_rate),
            "Scoring summary"
        );
        info!(
            mean_us = processing.mean_us,
            p50_us = processing.p50_us,
            p95_us = processing.p95_us,
            p99_us = processing.p99_us,
            max_us = processing.max_us,
            "Processing time"
        );
        info!(
            decode = snapshot.decode_failures,
            schema_mismatch = snapshot.schema_mismatches,
            inference = snapshot.inference_failures,
            transport = snapshot.transport_errors,
            store = snapshot.store_failures,
            "Dropped messages"
        );

        let dist = self.get_score_distribution();
        let total: u64 = dist.iter().sum();
        if total > 0 {
            let line = dist
                .iter()
                .enumerate()
                .map(|(i, count)| format!("{:.1}:{}", i as f64 / 10.0, count))
                .collect::<Vec<_>>()
                .join(" ");
            info!(distribution = %line, "Anomaly probability histogram");
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Processing time statistics
#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub count: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

/// Counters exposed by the status surface
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub vehicles_monitored: usize,
    pub events_scored: u64,
    pub anomalies_detected: u64,
    pub decode_failures: u64,
    pub schema_mismatches: u64,
    pub inference_failures: u64,
    pub transport_errors: u64,
    pub store_failures: u64,
    pub uptime_secs: u64,
}

/// Periodic summary logger
pub struct MetricsReporter {
    metrics: Arc<PipelineMetrics>,
    interval_secs: u64,
}

impl MetricsReporter {
    pub fn new(metrics: Arc<PipelineMetrics>, interval_secs: u64) -> Self {
        Self {
            metrics,
            interval_secs: interval_secs.max(1),
        }
    }

    /// Log a summary every interval until shutdown is signalled
    pub async fn start(self, mut shutdown: Shutdown) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.interval_secs));
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            tokio::select! {
                _ = interval.tick() => self.metrics.print_summary(),
                _ = shutdown.requested() => break,
            }
        }
    }
}
