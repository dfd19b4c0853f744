//! Configuration management for the fleet anomaly pipeline

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Environment variable naming an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "FLEET_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub broker: BrokerConfig,
    pub store: StoreConfig,
    pub models: ModelsConfig,
    pub detection: DetectionConfig,
    pub replicator: ReplicatorConfig,
    pub status: StatusConfig,
    pub logging: LoggingConfig,
}

/// Message broker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// NATS server URL
    pub url: String,
    /// Topic carrying telemetry events
    pub topic: String,
    /// Queue group shared by scorer instances
    #[serde(default = "default_consumer_group")]
    pub consumer_group: String,
    /// Upper bound on a single poll, in milliseconds
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

fn default_consumer_group() -> String {
    "predictor-group".to_string()
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

/// Transient state store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Redis connection URL
    pub url: String,
    /// Snapshot time-to-live in seconds, reset on every write
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// Prefix of snapshot keys (`{prefix}:{vehicle_id}`)
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_key_prefix() -> String {
    "vehicle".to_string()
}

/// Trained artifact configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ModelsConfig {
    /// ONNX classifier exported by the training step
    pub model_path: String,
    /// JSON array of feature names, in model input order
    pub features_path: String,
    /// Number of threads for ONNX inference (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Probability at or above which an event is anomalous (and alerted)
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    /// Raw event field echoed in alert records
    #[serde(default = "default_alert_field")]
    pub alert_field: String,
}

fn default_threshold() -> f64 {
    0.5
}

fn default_alert_field() -> String {
    "speed_kmh".to_string()
}

/// Dataset replay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReplicatorConfig {
    /// CSV dataset replayed as a live feed
    pub dataset_path: String,
    /// Column holding the vehicle identity
    #[serde(default = "default_id_column")]
    pub id_column: String,
    /// Pause after each published row, in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    /// Downcast float columns to single precision before publishing
    #[serde(default = "default_narrow_floats")]
    pub narrow_floats: bool,
    /// Seconds to wait for the broker before the first cycle
    #[serde(default)]
    pub startup_delay_secs: u64,
}

fn default_id_column() -> String {
    "vehicle_id".to_string()
}

fn default_interval_ms() -> u64 {
    100
}

fn default_narrow_floats() -> bool {
    true
}

/// Status surface configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StatusConfig {
    /// Listen address of the status endpoint
    pub bind_addr: String,
    /// Seconds between metrics summaries in the log
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,
}

fn default_report_interval_secs() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from `FLEET_CONFIG` or the default file
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path, with `FLEET__*` overrides
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("FLEET").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.detection.threshold) {
            bail!(
                "detection.threshold must lie in [0, 1], got {}",
                self.detection.threshold
            );
        }
        if self.store.ttl_secs == 0 {
            bail!("store.ttl_secs must be positive");
        }
        if self.broker.poll_timeout_ms == 0 {
            bail!("broker.poll_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.broker.poll_timeout_ms)
    }

    pub fn snapshot_ttl(&self) -> Duration {
        Duration::from_secs(self.store.ttl_secs)
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_millis(self.replicator.interval_ms)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            broker: BrokerConfig {
                url: "nats://localhost:4222".to_string(),
                topic: "telematics_stream".to_string(),
                consumer_group: default_consumer_group(),
                poll_timeout_ms: default_poll_timeout_ms(),
            },
            store: StoreConfig {
                url: "redis://localhost:6379/0".to_string(),
                ttl_secs: default_ttl_secs(),
                key_prefix: default_key_prefix(),
            },
            models: ModelsConfig {
                model_path: "models/telematics_xgb.onnx".to_string(),
                features_path: "models/model_features.json".to_string(),
                onnx_threads: default_onnx_threads(),
            },
            detection: DetectionConfig {
                threshold: default_threshold(),
                alert_field: default_alert_field(),
            },
            replicator: ReplicatorConfig {
                dataset_path: "synthetic_telematics.csv".to_string(),
                id_column: default_id_column(),
                interval_ms: default_interval_ms(),
                narrow_floats: default_narrow_floats(),
                startup_delay_secs: 0,
            },
            status: StatusConfig {
                bind_addr: "0.0.0.0:8000".to_string(),
                report_interval_secs: default_report_interval_secs(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}
