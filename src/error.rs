//! Per-message error taxonomy

use crate::broker::BrokerError;
use crate::store::StoreError;
use thiserror::Error;

/// A failure contained within one scoring iteration.
///
/// None of these stop the consumer loop: the message is dropped and the
/// scorer goes back to polling.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("decode failure: {0}")]
    Decode(String),

    #[error("schema mismatch for vehicle {vehicle_id}: missing or non-numeric {fields:?}")]
    SchemaMismatch {
        vehicle_id: String,
        fields: Vec<String>,
    },

    #[error("inference failure: {0}")]
    Inference(String),

    #[error("transport error: {0}")]
    Transport(#[from] BrokerError),

    #[error("state store error: {0}")]
    Store(#[from] StoreError),
}

/// Coarse failure category, used for counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Decode,
    SchemaMismatch,
    Inference,
    Transport,
    Store,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Decode => "decode",
            FailureKind::SchemaMismatch => "schema_mismatch",
            FailureKind::Inference => "inference",
            FailureKind::Transport => "transport",
            FailureKind::Store => "store",
        }
    }
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Decode(_) => FailureKind::Decode,
            PipelineError::SchemaMismatch { .. } => FailureKind::SchemaMismatch,
            PipelineError::Inference(_) => FailureKind::Inference,
            PipelineError::Transport(_) => FailureKind::Transport,
            PipelineError::Store(_) => FailureKind::Store,
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = PipelineError::SchemaMismatch {
            vehicle_id: "7".into(),
            fields: vec!["rpm".into()],
        };
        assert_eq!(err.kind(), FailureKind::SchemaMismatch);
        assert!(err.to_string().contains("rpm"));

        let err: PipelineError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert_eq!(err.kind().as_str(), "decode");
    }
}
