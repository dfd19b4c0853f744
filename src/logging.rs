//! Tracing subscriber setup

use crate::config::LoggingConfig;
use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber.
///
/// `RUST_LOG` directives apply first; each of `targets` is then enabled at the
/// configured level. `format = "json"` emits one JSON object per record.
pub fn init(config: &LoggingConfig, targets: &[&str]) -> Result<()> {
    let mut filter = EnvFilter::from_default_env();
    for target in targets {
        filter = filter.add_directive(format!("{}={}", target, config.level).parse()?);
    }

    let result = match config.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
    result.map_err(|e| anyhow!("Failed to initialize logging: {}", e))
}
