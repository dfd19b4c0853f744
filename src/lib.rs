//! Fleet Anomaly Pipeline Library
//!
//! Replays vehicle telemetry as a keyed stream, scores every event with a
//! pretrained classifier, and keeps a short-lived per-vehicle snapshot of
//! the latest readings and verdict.

pub mod broker;
pub mod config;
pub mod consumer;
pub mod dataset;
pub mod error;
pub mod feature_extractor;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod shutdown;
pub mod status;
pub mod store;
pub mod types;

pub use config::AppConfig;
pub use consumer::{Scorer, ScorerSettings, StepOutcome};
pub use dataset::VehicleDataset;
pub use error::{FailureKind, PipelineError};
pub use feature_extractor::FeatureSchema;
pub use models::inference::{Classifier, InferenceEngine};
pub use producer::EventReplicator;
pub use store::StateStore;
pub use types::{AnomalyAlert, ScoringResult, TelemetryEvent, VehicleSnapshot};
