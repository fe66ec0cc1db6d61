//! Error types for the client binary and its setup.

use crate::config::ConfigError;
use assetdesk_core::DeskError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("HTTP client setup failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Invalid auth header: {0}")]
    AuthHeader(String),
    #[error("Telemetry setup failed: {0}")]
    Telemetry(String),
}

/// Log a failed operation at the level its class calls for. Validation
/// failures never reach the network and are not reported as failures.
pub(crate) fn log_failure(operation: &str, err: &DeskError) {
    if err.is_validation() {
        tracing::debug!(operation, error = %err, "Rejected before sending");
    } else {
        tracing::warn!(operation, kind = ?err.kind(), error = %err, "Operation failed");
    }
}
