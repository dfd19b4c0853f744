#![allow(dead_code)]

use fleet_anomaly_pipeline::broker::{MemoryBroker, MemorySource};
use fleet_anomaly_pipeline::feature_extractor::{FeatureSchema, TELEMATICS_FEATURES};
use fleet_anomaly_pipeline::metrics::PipelineMetrics;
use fleet_anomaly_pipeline::store::MemoryStateStore;
use fleet_anomaly_pipeline::{Classifier, InferenceEngine, Scorer, ScorerSettings};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

pub const TOPIC: &str = "telematics_stream";

/// Anomaly probability grows with engine temperature: `engine_temp_c / 200`
pub struct EngineTempClassifier {
    temp_index: usize,
}

impl EngineTempClassifier {
    pub fn new(schema: &FeatureSchema) -> Self {
        let temp_index = schema
            .feature_names()
            .iter()
            .position(|n| n == "engine_temp_c")
            .unwrap();
        Self { temp_index }
    }
}

impl Classifier for EngineTempClassifier {
    fn name(&self) -> &str {
        "engine_temp_rule"
    }

    fn input_width(&self) -> Option<usize> {
        Some(TELEMATICS_FEATURES.len())
    }

    fn predict_proba(&self, features: &[f32]) -> anyhow::Result<f64> {
        Ok((features[self.temp_index] as f64 / 200.0).clamp(0.0, 1.0))
    }
}

pub fn engine() -> Arc<InferenceEngine> {
    let schema = FeatureSchema::telematics();
    let classifier = EngineTempClassifier::new(&schema);
    Arc::new(InferenceEngine::new(Box::new(classifier), schema, 0.5).unwrap())
}

pub struct Harness {
    pub broker: MemoryBroker,
    pub store: Arc<MemoryStateStore>,
    pub metrics: Arc<PipelineMetrics>,
    pub scorer: Scorer<MemorySource>,
}

pub fn harness(partitions: usize) -> Harness {
    let broker = MemoryBroker::new(partitions);
    let store = Arc::new(MemoryStateStore::new());
    let metrics = Arc::new(PipelineMetrics::new());
    let settings = ScorerSettings {
        poll_timeout: Duration::from_millis(50),
        ..ScorerSettings::default()
    };
    let scorer = Scorer::new(
        broker.subscribe(TOPIC),
        engine(),
        store.clone(),
        metrics.clone(),
        settings,
    );
    Harness {
        broker,
        store,
        metrics,
        scorer,
    }
}

/// A complete event; `engine_temp_c` drives the verdict
pub fn event(vehicle_id: u32, speed_kmh: f64, engine_temp_c: f64) -> Map<String, Value> {
    let value = json!({
        "vehicle_id": vehicle_id,
        "speed_kmh": speed_kmh,
        "acceleration": 0.5,
        "lat": 40.25,
        "lon": -3.75,
        "rpm": 2200,
        "engine_temp_c": engine_temp_c,
        "vibration": 0.125,
        "fuel_level_pct": 60.0,
        "engine_load": 45.0,
        "brake_pressure": 1.5,
        "battery_v": 12.5,
        "co2": 400.0,
        "failure_within_30min": 0
    });
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

pub fn payload(fields: &Map<String, Value>) -> Vec<u8> {
    serde_json::to_vec(fields).unwrap()
}

/// CSV with the trainer's columns; `rows` are (vehicle_id, speed_kmh, engine_temp_c)
pub fn dataset_csv(rows: &[(u32, f64, f64)]) -> String {
    let mut csv = String::from("vehicle_id,");
    csv.push_str(&TELEMATICS_FEATURES.join(","));
    csv.push_str(",failure_within_30min\n");
    for (vehicle, speed, temp) in rows {
        csv.push_str(&format!(
            "{vehicle},{speed},0.5,40.25,-3.75,2200,{temp},0.125,60.0,45.0,1.5,12.5,400.0,0\n"
        ));
    }
    csv
}
