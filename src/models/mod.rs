//! Trained classifier loading and inference

pub mod inference;
pub mod loader;

pub use inference::{Classifier, InferenceEngine, OnnxClassifier, Prediction};
pub use loader::{load_artifacts, LoadedModel, ModelLoader};
