//! Anomaly alert records

use crate::types::event::{value_as_text, TelemetryEvent};
use crate::types::snapshot::ScoringResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Risk band of a positive verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Elevated,
    High,
    Critical,
}

impl RiskLevel {
    /// Band a probability that already crossed the anomaly threshold
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.9 {
            RiskLevel::Critical
        } else if probability >= 0.7 {
            RiskLevel::High
        } else {
            RiskLevel::Elevated
        }
    }
}

/// Alert raised for an anomalous event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyAlert {
    /// Unique alert identifier
    pub alert_id: String,

    pub vehicle_id: String,

    /// Predicted anomaly probability (0.0 - 1.0)
    pub anomaly_probability: f64,

    pub risk_level: RiskLevel,

    /// Name of the raw reading echoed with the alert
    pub salient_field: String,

    /// Its value as text, if the event carried it
    pub salient_value: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl AnomalyAlert {
    pub fn new(event: &TelemetryEvent, result: &ScoringResult, salient_field: &str) -> Self {
        Self {
            alert_id: uuid::Uuid::new_v4().to_string(),
            vehicle_id: result.vehicle_id.clone(),
            anomaly_probability: result.anomaly_probability,
            risk_level: RiskLevel::from_probability(result.anomaly_probability),
            salient_field: salient_field.to_string(),
            salient_value: event.get(salient_field).map(value_as_text),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_from_probability() {
        assert_eq!(RiskLevel::from_probability(0.5), RiskLevel::Elevated);
        assert_eq!(RiskLevel::from_probability(0.75), RiskLevel::High);
        assert_eq!(RiskLevel::from_probability(0.95), RiskLevel::Critical);
    }

    #[test]
    fn test_alert_carries_salient_reading() {
        let event =
            TelemetryEvent::from_slice(br#"{"vehicle_id": "V9", "speed_kmh": 131.0}"#).unwrap();
        let result = ScoringResult {
            vehicle_id: "V9".into(),
            anomaly_probability: 0.82,
            is_anomaly: true,
        };

        let alert = AnomalyAlert::new(&event, &result, "speed_kmh");
        assert_eq!(alert.vehicle_id, "V9");
        assert_eq!(alert.risk_level, RiskLevel::High);
        assert_eq!(alert.salient_value.as_deref(), Some("131.0"));

        let missing = AnomalyAlert::new(&event, &result, "brake_pressure");
        assert_eq!(missing.salient_value, None);
    }
}
