//! Feature schema and feature-vector assembly.
//!
//! The schema is the ordered list of fields the classifier was trained on.
//! It is loaded once, next to the model, and only read afterwards.

use crate::error::PipelineError;
use crate::types::event::TelemetryEvent;
use anyhow::{bail, Context, Result};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Fields used by the trainer, in model input order
pub const TELEMATICS_FEATURES: [&str; 12] = [
    "speed_kmh",
    "acceleration",
    "lat",
    "lon",
    "rpm",
    "engine_temp_c",
    "vibration",
    "fuel_level_pct",
    "engine_load",
    "brake_pressure",
    "battery_v",
    "co2",
];

/// Ordered, immutable list of feature names.
///
/// Cheap to clone; clones share the same name list.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    names: Arc<[String]>,
}

impl FeatureSchema {
    /// Build a schema, rejecting empty and duplicate names
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            bail!("feature schema is empty");
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if name.trim().is_empty() {
                bail!("feature schema contains a blank name");
            }
            if !seen.insert(name.as_str()) {
                bail!("feature schema lists `{}` twice", name);
            }
        }
        Ok(Self {
            names: names.into(),
        })
    }

    /// The schema the telematics model is trained with
    pub fn telematics() -> Self {
        Self {
            names: TELEMATICS_FEATURES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Load the sidecar written by the training step (a JSON array of names)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path)
            .with_context(|| format!("Feature schema not found at {}", path.display()))?;
        let names: Vec<String> = serde_json::from_slice(&raw)
            .with_context(|| format!("Feature schema at {} is not a JSON array of names", path.display()))?;
        Self::new(names).with_context(|| format!("Invalid feature schema at {}", path.display()))
    }

    /// Assemble the model input for one event, in schema order.
    ///
    /// Every schema field must be present and numeric; otherwise nothing is
    /// returned and the error names all offending fields.
    pub fn extract(&self, event: &TelemetryEvent) -> Result<Vec<f32>, PipelineError> {
        let mut features = Vec::with_capacity(self.names.len());
        let mut missing = Vec::new();

        for name in self.names.iter() {
            match event.numeric(name) {
                Some(value) => features.push(value as f32),
                None => missing.push(name.clone()),
            }
        }

        if !missing.is_empty() {
            return Err(PipelineError::SchemaMismatch {
                vehicle_id: event.vehicle_id().to_string(),
                fields: missing,
            });
        }

        Ok(features)
    }

    /// Number of features in the vector
    pub fn feature_count(&self) -> usize {
        self.names.len()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn full_event() -> TelemetryEvent {
        TelemetryEvent::from_slice(
            br#"{"vehicle_id": 1, "speed_kmh": 60.0, "acceleration": 0.4, "lat": 52.1,
                 "lon": 4.3, "rpm": 2200, "engine_temp_c": 91.5, "vibration": 0.2,
                 "fuel_level_pct": 55.0, "engine_load": 40.0, "brake_pressure": 1.1,
                 "battery_v": 12.6, "co2": 410.0, "failure_within_30min": 0}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_extract_in_schema_order() {
        let schema = FeatureSchema::telematics();
        let features = schema.extract(&full_event()).unwrap();

        assert_eq!(features.len(), schema.feature_count());
        assert_eq!(features[0], 60.0); // speed_kmh
        assert_eq!(features[4], 2200.0); // rpm
        assert_eq!(features[11], 410.0); // co2
    }

    #[test]
    fn test_missing_field_is_schema_mismatch() {
        let schema = FeatureSchema::new(["speed_kmh", "rpm", "co2"]).unwrap();
        let event =
            TelemetryEvent::from_slice(br#"{"vehicle_id": 4, "speed_kmh": 60.0, "co2": null}"#)
                .unwrap();

        match schema.extract(&event) {
            Err(PipelineError::SchemaMismatch { vehicle_id, fields }) => {
                assert_eq!(vehicle_id, "4");
                assert_eq!(fields, vec!["rpm".to_string(), "co2".to_string()]);
            }
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_empty_and_duplicate_names() {
        assert!(FeatureSchema::new(Vec::<String>::new()).is_err());
        assert!(FeatureSchema::new(["rpm", "rpm"]).is_err());
        assert!(FeatureSchema::new(["rpm", " "]).is_err());
    }

    #[test]
    fn test_load_sidecar() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"["speed_kmh", "rpm"]"#).unwrap();

        let schema = FeatureSchema::load(file.path()).unwrap();
        assert_eq!(schema.feature_names(), &["speed_kmh".to_string(), "rpm".to_string()]);

        assert!(FeatureSchema::load("/nonexistent/model_features.json").is_err());
    }
}
