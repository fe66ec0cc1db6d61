//! Toast-level outcome messages.

use assetdesk_core::{ConflictError, DeskError, NetworkError};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Warning,
    Error,
    Success,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message)
    }

    /// Describe a failed `operation`. Validation problems are warnings, the
    /// rest are errors; the underlying data is unchanged either way.
    pub fn from_error(operation: &str, err: &DeskError) -> Self {
        match err {
            DeskError::Conflict(ConflictError::ActiveRelationExists { .. }) => {
                Self::new(NotificationLevel::Error, "This device already has an active relation")
            }
            DeskError::Conflict(ConflictError::Rejected { message, .. }) => Self::new(
                NotificationLevel::Error,
                format!("Failed to {}: {}", operation, message),
            ),
            DeskError::Validation(inner) => Self::new(
                NotificationLevel::Warning,
                format!("Cannot {}: {}", operation, inner),
            ),
            DeskError::NotFound(inner) => {
                Self::new(NotificationLevel::Error, format!("Failed to {}: {}", operation, inner))
            }
            DeskError::Network(NetworkError::Cancelled { .. }) => {
                Self::new(NotificationLevel::Info, format!("Cancelled {}", operation))
            }
            DeskError::Network(inner) => {
                Self::new(NotificationLevel::Error, format!("Failed to {}: {}", operation, inner))
            }
        }
    }

    pub fn is_error(&self) -> bool {
        self.level == NotificationLevel::Error
    }
}
