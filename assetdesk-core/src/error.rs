//! Error types for AssetDesk operations

use crate::filter::EntityKind;
use crate::identity::DeviceId;
use thiserror::Error;

/// Failures talking to the collaborating API.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    #[error("Request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("Server returned {status} for {endpoint}: {message}")]
    Server {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Request to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("Request to {endpoint} was cancelled")]
    Cancelled { endpoint: String },

    #[error("Unexpected response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
}

/// Client-side rejections raised before any request is sent.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Unknown filter field {field} for {kind}")]
    UnknownField { kind: EntityKind, field: String },
}

impl ValidationError {
    /// The field the error is scoped to.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::RequiredFieldMissing { field }
            | ValidationError::InvalidValue { field, .. }
            | ValidationError::UnknownField { field, .. } => field,
        }
    }

    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::RequiredFieldMissing {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Exclusivity preconditions that failed.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConflictError {
    #[error("Device {device_id} already has an active relation")]
    ActiveRelationExists { device_id: DeviceId },

    #[error("{operation} rejected by the store: {message}")]
    Rejected { operation: String, message: String },
}

/// The requested entity does not exist.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{entity} {id} not found")]
pub struct NotFoundError {
    pub entity: &'static str,
    pub id: String,
}

/// Flat classification used at UI boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Validation,
    Conflict,
    NotFound,
}

/// Master error type for all AssetDesk errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeskError {
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Conflict: {0}")]
    Conflict(#[from] ConflictError),

    #[error("Not found: {0}")]
    NotFound(#[from] NotFoundError),
}

impl DeskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeskError::Network(_) => ErrorKind::Network,
            DeskError::Validation(_) => ErrorKind::Validation,
            DeskError::Conflict(_) => ErrorKind::Conflict,
            DeskError::NotFound(_) => ErrorKind::NotFound,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, DeskError::Conflict(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, DeskError::Validation(_))
    }

    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DeskError::NotFound(NotFoundError {
            entity,
            id: id.to_string(),
        })
    }
}

/// Result type alias for AssetDesk operations.
pub type DeskResult<T> = Result<T, DeskError>;
