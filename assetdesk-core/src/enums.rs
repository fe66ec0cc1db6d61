//! Enum types for AssetDesk entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error when parsing an enum from its wire representation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumParseError {
    pub type_name: &'static str,
    pub value: String,
}

impl fmt::Display for EnumParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid {}: {}", self.type_name, self.value)
    }
}

impl std::error::Error for EnumParseError {}

/// Kind of tracked hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Computer,
    Monitor,
}

impl DeviceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceType::Computer => "computer",
            DeviceType::Monitor => "monitor",
        }
    }

    pub fn all() -> &'static [DeviceType] {
        &[DeviceType::Computer, DeviceType::Monitor]
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceType {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "computer" => Ok(DeviceType::Computer),
            "monitor" => Ok(DeviceType::Monitor),
            _ => Err(EnumParseError {
                type_name: "device type",
                value: s.to_string(),
            }),
        }
    }
}

/// Where a device is in its service life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallStatus {
    InInventory,
    Deployed,
    EndOfLife,
    Disposed,
}

impl InstallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstallStatus::InInventory => "in_inventory",
            InstallStatus::Deployed => "deployed",
            InstallStatus::EndOfLife => "end_of_life",
            InstallStatus::Disposed => "disposed",
        }
    }

    pub fn all() -> &'static [InstallStatus] {
        &[
            InstallStatus::InInventory,
            InstallStatus::Deployed,
            InstallStatus::EndOfLife,
            InstallStatus::Disposed,
        ]
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstallStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstallStatus::all()
            .iter()
            .copied()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| EnumParseError {
                type_name: "install status",
                value: s.to_string(),
            })
    }
}

/// Ticket workflow state. Only the encoding lives here; transitions are the
/// server's business.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    New,
    OnHold,
    InProgress,
    Resolved,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::New => "new",
            TicketStatus::OnHold => "on_hold",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Cancelled => "cancelled",
        }
    }

    pub fn all() -> &'static [TicketStatus] {
        &[
            TicketStatus::New,
            TicketStatus::OnHold,
            TicketStatus::InProgress,
            TicketStatus::Resolved,
            TicketStatus::Cancelled,
        ]
    }

    /// Resolved and cancelled tickets no longer need work.
    pub fn is_closed(&self) -> bool {
        matches!(self, TicketStatus::Resolved | TicketStatus::Cancelled)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = EnumParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TicketStatus::all()
            .iter()
            .copied()
            .find(|status| status.as_str() == s.trim())
            .ok_or_else(|| EnumParseError {
                type_name: "ticket status",
                value: s.to_string(),
            })
    }
}
