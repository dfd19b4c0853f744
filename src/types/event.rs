//! Telemetry event as carried on the stream

use crate::error::PipelineError;
use serde_json::{Map, Value};

/// Field carrying the vehicle identity in every payload
pub const VEHICLE_ID_FIELD: &str = "vehicle_id";

/// One row of sensor readings for one vehicle at one instant.
///
/// The payload is a flat JSON object of field name to value; the identity is
/// one of those fields. Events are decoded once, read, then dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryEvent {
    vehicle_id: String,
    fields: Map<String, Value>,
}

impl TelemetryEvent {
    /// Decode a message payload.
    ///
    /// Fails when the payload is not a JSON object or has no usable
    /// `vehicle_id` (string or number).
    pub fn from_slice(payload: &[u8]) -> Result<Self, PipelineError> {
        let value: Value = serde_json::from_slice(payload)?;
        let Value::Object(fields) = value else {
            return Err(PipelineError::Decode(
                "payload is not a JSON object".to_string(),
            ));
        };
        Self::from_fields(fields)
    }

    /// Build an event from already-parsed fields
    pub fn from_fields(fields: Map<String, Value>) -> Result<Self, PipelineError> {
        let vehicle_id = match fields.get(VEHICLE_ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(PipelineError::Decode(format!(
                    "payload has no usable `{VEHICLE_ID_FIELD}`"
                )))
            }
        };
        Ok(Self { vehicle_id, fields })
    }

    pub fn vehicle_id(&self) -> &str {
        &self.vehicle_id
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Numeric value of a field; booleans count as 0/1, null and text do not
    pub fn numeric(&self, name: &str) -> Option<f64> {
        match self.fields.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Render a field value the way it is stored in a snapshot
pub fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_numeric_vehicle_id() {
        let event =
            TelemetryEvent::from_slice(br#"{"vehicle_id": 12, "speed_kmh": 88.5, "rpm": 2400}"#)
                .unwrap();
        assert_eq!(event.vehicle_id(), "12");
        assert_eq!(event.numeric("speed_kmh"), Some(88.5));
        assert_eq!(event.numeric("rpm"), Some(2400.0));
        assert_eq!(event.len(), 3);
    }

    #[test]
    fn test_decode_rejects_non_object_and_missing_id() {
        let err = TelemetryEvent::from_slice(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));

        let err = TelemetryEvent::from_slice(br#"{"speed_kmh": 10}"#).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));

        let err = TelemetryEvent::from_slice(b"not json").unwrap_err();
        assert!(matches!(err, PipelineError::Decode(_)));
    }

    #[test]
    fn test_null_and_text_are_not_numeric() {
        let event =
            TelemetryEvent::from_slice(br#"{"vehicle_id": "V1", "rpm": null, "note": "ok"}"#)
                .unwrap();
        assert_eq!(event.numeric("rpm"), None);
        assert_eq!(event.numeric("note"), None);
        assert_eq!(event.numeric("absent"), None);
    }

    #[test]
    fn test_value_as_text() {
        assert_eq!(value_as_text(&serde_json::json!(12.5)), "12.5");
        assert_eq!(value_as_text(&serde_json::json!("V1")), "V1");
        assert_eq!(value_as_text(&serde_json::json!(true)), "true");
        assert_eq!(value_as_text(&Value::Null), "");
    }
}
