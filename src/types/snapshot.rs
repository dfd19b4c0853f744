//! Scoring results and the per-vehicle snapshot written to the state store

use crate::types::event::{value_as_text, TelemetryEvent};
use std::collections::BTreeMap;

pub const ANOMALY_SCORE_FIELD: &str = "anomaly_score";
pub const IS_ANOMALY_FIELD: &str = "is_anomaly";

/// Verdict for one event
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringResult {
    pub vehicle_id: String,
    /// Positive-class probability (0.0 - 1.0)
    pub anomaly_probability: f64,
    pub is_anomaly: bool,
}

/// Latest known state and verdict for one vehicle.
///
/// Every field is text. A write replaces the whole record; the store owns
/// the snapshot and forgets it once its TTL lapses.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    key: String,
    fields: BTreeMap<String, String>,
}

impl VehicleSnapshot {
    /// Store key for a vehicle: `{prefix}:{vehicle_id}`
    pub fn key_for(prefix: &str, vehicle_id: &str) -> String {
        format!("{prefix}:{vehicle_id}")
    }

    /// Flatten an event plus its verdict into a snapshot
    pub fn project(event: &TelemetryEvent, result: &ScoringResult, key_prefix: &str) -> Self {
        let mut fields: BTreeMap<String, String> = event
            .fields()
            .map(|(name, value)| (name.clone(), value_as_text(value)))
            .collect();
        fields.insert(
            ANOMALY_SCORE_FIELD.to_string(),
            result.anomaly_probability.to_string(),
        );
        fields.insert(IS_ANOMALY_FIELD.to_string(), result.is_anomaly.to_string());

        Self {
            key: Self::key_for(key_prefix, event.vehicle_id()),
            fields,
        }
    }

    /// Rebuild a snapshot from stored fields
    pub fn from_parts(key: String, fields: BTreeMap<String, String>) -> Self {
        Self { key, fields }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn anomaly_score(&self) -> Option<f64> {
        self.get(ANOMALY_SCORE_FIELD)?.parse().ok()
    }

    pub fn is_anomaly(&self) -> Option<bool> {
        self.get(IS_ANOMALY_FIELD)?.parse().ok()
    }
}
