//! Type definitions for the fleet anomaly pipeline

pub mod alert;
pub mod event;
pub mod snapshot;

pub use alert::{AnomalyAlert, RiskLevel};
pub use event::{TelemetryEvent, VEHICLE_ID_FIELD};
pub use snapshot::{ScoringResult, VehicleSnapshot};
