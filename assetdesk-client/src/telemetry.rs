//! Tracing subscriber setup.

use crate::config::TelemetryConfig;
use crate::error::ClientError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "assetdesk_client=info";

/// `RUST_LOG` wins over the configured filter, which wins over the default.
pub fn env_filter(config: &TelemetryConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(config.filter.as_deref().unwrap_or(DEFAULT_FILTER))
    })
}

/// Install the global subscriber. Call once, before any command runs.
pub fn init(config: &TelemetryConfig) -> Result<(), ClientError> {
    let registry = tracing_subscriber::registry().with(env_filter(config));
    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    result.map_err(|e| ClientError::Telemetry(e.to_string()))?;

    tracing::debug!(json = config.json, "Telemetry initialized");
    Ok(())
}
