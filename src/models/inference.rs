//! Anomaly inference over a fixed-order feature vector

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::feature_extractor::FeatureSchema;
use crate::models::loader::{load_artifacts, LoadedModel};
use crate::types::event::TelemetryEvent;
use crate::types::snapshot::ScoringResult;
use anyhow::{bail, Context, Result};
use ort::memory::Allocator;
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType};
use std::sync::Mutex;
use tracing::{debug, info};

/// A binary classifier producing the positive-class probability
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    /// Feature width the classifier was built for, when it declares one
    fn input_width(&self) -> Option<usize>;

    /// Probability of the anomalous class for one row
    fn predict_proba(&self, features: &[f32]) -> Result<f64>;
}

/// Probability and verdict for one feature vector
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub probability: f64,
    pub is_anomaly: bool,
}

/// Classifier plus the schema it was trained with.
///
/// Built once at startup and shared read-only by the scorer.
pub struct InferenceEngine {
    classifier: Box<dyn Classifier>,
    schema: FeatureSchema,
    threshold: f64,
}

impl InferenceEngine {
    /// Pair a classifier with its schema, checking that their widths agree
    pub fn new(classifier: Box<dyn Classifier>, schema: FeatureSchema, threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            bail!("anomaly threshold must lie in [0, 1], got {}", threshold);
        }
        if let Some(width) = classifier.input_width() {
            if width != schema.feature_count() {
                bail!(
                    "model `{}` expects {} features but the schema lists {}",
                    classifier.name(),
                    width,
                    schema.feature_count()
                );
            }
        }

        info!(
            model = %classifier.name(),
            features = schema.feature_count(),
            threshold = threshold,
            "Inference engine initialized"
        );

        Ok(Self {
            classifier,
            schema,
            threshold,
        })
    }

    /// Load the ONNX classifier and schema sidecar named in the configuration
    pub fn load(config: &AppConfig) -> Result<Self> {
        let (model, schema) = load_artifacts(&config.models).context("Failed to load trained artifacts")?;
        Self::new(
            Box::new(OnnxClassifier::new(model)),
            schema,
            config.detection.threshold,
        )
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn model_name(&self) -> &str {
        self.classifier.name()
    }

    /// Classify one assembled feature vector
    pub fn predict(&self, features: &[f32]) -> Result<Prediction, PipelineError> {
        if features.len() != self.schema.feature_count() {
            return Err(PipelineError::Inference(format!(
                "expected {} features, got {}",
                self.schema.feature_count(),
                features.len()
            )));
        }

        let probability = self
            .classifier
            .predict_proba(features)
            .map_err(|e| PipelineError::Inference(format!("{e:#}")))?;

        if !probability.is_finite() {
            return Err(PipelineError::Inference(format!(
                "model returned a non-finite probability ({probability})"
            )));
        }
        let probability = probability.clamp(0.0, 1.0);

        Ok(Prediction {
            probability,
            is_anomaly: probability >= self.threshold,
        })
    }

    /// Assemble features from an event and classify them
    pub fn score(&self, event: &TelemetryEvent) -> Result<ScoringResult, PipelineError> {
        let features = self.schema.extract(event)?;
        let prediction = self.predict(&features)?;

        debug!(
            vehicle_id = %event.vehicle_id(),
            probability = prediction.probability,
            "Event scored"
        );

        Ok(ScoringResult {
            vehicle_id: event.vehicle_id().to_string(),
            anomaly_probability: prediction.probability,
            is_anomaly: prediction.is_anomaly,
        })
    }
}

/// ONNX Runtime classifier (e.g. an exported XGBoost model)
pub struct OnnxClassifier {
    name: String,
    input_width: Option<usize>,
    // Session::run needs exclusive access.
    model: Mutex<LoadedModel>,
}

impl OnnxClassifier {
    pub fn new(model: LoadedModel) -> Self {
        Self {
            name: model.name.clone(),
            input_width: model.input_width,
            model: Mutex::new(model),
        }
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_width(&self) -> Option<usize> {
        self.input_width
    }

    fn predict_proba(&self, features: &[f32]) -> Result<f64> {
        use ort::value::Tensor;

        let mut model = self
            .model
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        // Prepare input tensor - shape [1, num_features]
        let shape = vec![1_i64, features.len() as i64];
        let input_tensor =
            Tensor::from_array((shape, features.to_vec())).context("Failed to create input tensor")?;

        let LoadedModel {
            session,
            input_name,
            output_name,
            ..
        } = &mut *model;
        let outputs = session.run(ort::inputs![input_name.as_str() => input_tensor])?;

        extract_probability(&outputs, output_name, &self.name)
    }
}

/// Pull the positive-class probability out of the session outputs.
///
/// Handles tensor outputs (`[1, 2]`, `[1, 1]`) and the `seq(map(int64, float))`
/// layout some converters emit for classifiers.
fn extract_probability(
    outputs: &ort::session::SessionOutputs,
    output_name: &str,
    model_name: &str,
) -> Result<f64> {
    if let Some(output) = outputs.get(output_name) {
        if let Some(prob) = probability_from_value(&output, model_name) {
            return Ok(prob);
        }
    }

    for (name, output) in outputs.iter() {
        if name.contains("label") {
            continue;
        }
        if let Some(prob) = probability_from_value(&output, model_name) {
            debug!(model = %model_name, output = %name, "Probability read from fallback output");
            return Ok(prob);
        }
    }

    bail!("model `{}` produced no readable probability output", model_name)
}

fn probability_from_value(output: &ort::value::DynValue, model_name: &str) -> Option<f64> {
    if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
        let dims: Vec<i64> = shape.iter().copied().collect();
        return positive_class_from_tensor(&dims, data);
    }

    if DynSequenceValueType::can_downcast(&output.dtype()) {
        return match positive_class_from_sequence_map(output) {
            Ok(prob) => Some(prob),
            Err(e) => {
                debug!(model = %model_name, error = %e, "seq(map) output not readable");
                None
            }
        };
    }

    None
}

/// Positive class from a `[batch, classes]` or `[classes]` tensor
fn positive_class_from_tensor(dims: &[i64], data: &[f32]) -> Option<f64> {
    let classes = *dims.last()?;
    match classes {
        c if c >= 2 => data.get(1).map(|&p| p as f64),
        1 => data.first().map(|&p| p as f64),
        _ => None,
    }
}

fn positive_class_from_sequence_map(output: &ort::value::DynValue) -> Result<f64> {
    let allocator = Allocator::default();

    let sequence = output
        .downcast_ref::<DynSequenceValueType>()
        .map_err(|e| anyhow::anyhow!("Failed to downcast to sequence: {}", e))?;
    let maps = sequence.try_extract_sequence::<DynMapValueType>(&allocator)?;
    let first = maps.first().context("Empty sequence")?;
    let pairs = first.try_extract_key_values::<i64, f32>()?;

    if let Some((_, prob)) = pairs.iter().find(|(class, _)| *class == 1) {
        return Ok(*prob as f64);
    }
    if let Some((_, prob)) = pairs.iter().find(|(class, _)| *class == 0) {
        return Ok(1.0 - *prob as f64);
    }
    bail!("No class probability found in map")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedClassifier {
        width: Option<usize>,
        probability: f64,
    }

    impl Classifier for FixedClassifier {
        fn name(&self) -> &str {
            "fixed"
        }
        fn input_width(&self) -> Option<usize> {
            self.width
        }
        fn predict_proba(&self, _features: &[f32]) -> Result<f64> {
            Ok(self.probability)
        }
    }

    fn engine(probability: f64) -> InferenceEngine {
        InferenceEngine::new(
            Box::new(FixedClassifier {
                width: Some(2),
                probability,
            }),
            FeatureSchema::new(["speed_kmh", "rpm"]).unwrap(),
            0.5,
        )
        .unwrap()
    }

    #[test]
    fn test_verdict_uses_inclusive_threshold() {
        assert!(engine(0.5).predict(&[1.0, 2.0]).unwrap().is_anomaly);
        assert!(!engine(0.4999).predict(&[1.0, 2.0]).unwrap().is_anomaly);
    }

    #[test]
    fn test_width_mismatch_is_fatal_at_construction() {
        let result = InferenceEngine::new(
            Box::new(FixedClassifier {
                width: Some(11),
                probability: 0.1,
            }),
            FeatureSchema::telematics(),
            0.5,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_vector_length_is_inference_failure() {
        let err = engine(0.1).predict(&[1.0]).unwrap_err();
        assert!(matches!(err, PipelineError::Inference(_)));
    }

    #[test]
    fn test_non_finite_probability_rejected() {
        let err = engine(f64::NAN).predict(&[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, PipelineError::Inference(_)));
    }

    #[test]
    fn test_positive_class_from_tensor() {
        assert_eq!(positive_class_from_tensor(&[1, 2], &[0.25, 0.75]), Some(0.75));
        assert_eq!(positive_class_from_tensor(&[1, 1], &[0.5]), Some(0.5));
        assert_eq!(positive_class_from_tensor(&[2], &[0.9, 0.1]), Some(0.1f32 as f64));
        assert_eq!(positive_class_from_tensor(&[], &[]), None);
    }
}
