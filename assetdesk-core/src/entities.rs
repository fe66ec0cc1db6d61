//! Core entity structures and their write payloads

use crate::{
    DeviceId, DeviceType, DeskResult, EntityIdType, InstallStatus, RelationId, TicketId,
    TicketStatus, Timestamp, UserId, ValidationError, WorknoteId,
};
use serde::{Deserialize, Serialize};

fn require_text(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

fn require_id<I: EntityIdType>(field: &str, id: &I) -> Result<(), ValidationError> {
    if id.is_nil() {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

fn validate_email(field: &str, email: &str) -> Result<(), ValidationError> {
    require_text(field, email)?;
    match email.trim().split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ValidationError::invalid(field, "must be an email address")),
    }
}

// ============================================================================
// DEVICES
// ============================================================================

/// A tracked computer or monitor.
///
/// `serial_number` and `device_type` are fixed at creation; the update
/// payload has no way to express a change to them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub device_type: DeviceType,
    pub serial_number: String,
    pub model: String,
    pub order_id: String,
    pub install_status: InstallStatus,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInsert {
    pub device_type: DeviceType,
    pub serial_number: String,
    pub model: String,
    pub order_id: String,
    pub install_status: InstallStatus,
}

impl DeviceInsert {
    pub fn validate(&self) -> DeskResult<()> {
        require_text("serial_number", &self.serial_number)?;
        require_text("model", &self.model)?;
        require_text("order_id", &self.order_id)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_status: Option<InstallStatus>,
}

impl DeviceUpdate {
    pub fn is_empty(&self) -> bool {
        self.model.is_none() && self.order_id.is_none() && self.install_status.is_none()
    }

    pub fn validate(&self) -> DeskResult<()> {
        if self.is_empty() {
            return Err(ValidationError::invalid("device", "update has no changes").into());
        }
        if let Some(model) = &self.model {
            require_text("model", model)?;
        }
        if let Some(order_id) = &self.order_id {
            require_text("order_id", order_id)?;
        }
        Ok(())
    }
}

/// Device columns embedded in relation rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRef {
    pub id: DeviceId,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub device_type: Option<DeviceType>,
    #[serde(default)]
    pub order_id: Option<String>,
}

impl From<&Device> for DeviceRef {
    fn from(device: &Device) -> Self {
        Self {
            id: device.id,
            serial_number: Some(device.serial_number.clone()),
            model: Some(device.model.clone()),
            device_type: Some(device.device_type),
            order_id: Some(device.order_id.clone()),
        }
    }
}

// ============================================================================
// USERS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInsert {
    pub name: String,
    pub email: String,
}

impl UserInsert {
    pub fn validate(&self) -> DeskResult<()> {
        require_text("name", &self.name)?;
        validate_email("email", &self.email)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl UserUpdate {
    pub fn validate(&self) -> DeskResult<()> {
        if self.name.is_none() && self.email.is_none() {
            return Err(ValidationError::invalid("user", "update has no changes").into());
        }
        if let Some(name) = &self.name {
            require_text("name", name)?;
        }
        if let Some(email) = &self.email {
            validate_email("email", email)?;
        }
        Ok(())
    }
}

/// User columns embedded in ticket, relation and worknote rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<&User> for UserRef {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: Some(user.email.clone()),
            name: Some(user.name.clone()),
        }
    }
}

// ============================================================================
// TICKETS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: TicketId,
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TicketStatus,
    pub caller: UserRef,
    #[serde(rename = "assigned_to", default)]
    pub operator: Option<UserRef>,
    #[serde(default)]
    pub estimated_resolution_date: Option<Timestamp>,
    #[serde(default)]
    pub resolution_date: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Flat ticket row, as returned by ticket writes (references are bare ids).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketRecord {
    pub id: TicketId,
    pub number: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TicketStatus,
    #[serde(default)]
    pub caller_id: Option<UserId>,
    #[serde(default)]
    pub assigned_to: Option<UserId>,
    #[serde(default)]
    pub estimated_resolution_date: Option<Timestamp>,
    #[serde(default)]
    pub resolution_date: Option<Timestamp>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketInsert {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TicketStatus,
    pub caller_id: UserId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_resolution_date: Option<Timestamp>,
}

impl TicketInsert {
    pub fn validate(&self) -> DeskResult<()> {
        require_text("title", &self.title)?;
        require_id("caller_id", &self.caller_id)?;
        Ok(())
    }
}

/// Partial ticket update. The nested options on nullable columns distinguish
/// "leave alone" (`None`) from "clear" (`Some(None)`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TicketUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TicketStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Option<UserId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_resolution_date: Option<Option<Timestamp>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolution_date: Option<Option<Timestamp>>,
}

impl TicketUpdate {
    pub fn validate(&self) -> DeskResult<()> {
        if let Some(title) = &self.title {
            require_text("title", title)?;
        }
        Ok(())
    }
}

/// Tickets per day, as served to the dashboard charts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketsStats {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorInfo {
    pub id: Option<UserId>,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorTicketsStats {
    pub operator: OperatorInfo,
    pub count: i64,
}

// ============================================================================
// WORKNOTES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worknote {
    pub id: WorknoteId,
    pub ticket_id: TicketId,
    pub note: String,
    #[serde(default)]
    pub author: Option<UserRef>,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorknoteInsert {
    pub ticket_id: TicketId,
    pub note: String,
    pub author_id: UserId,
}

impl WorknoteInsert {
    pub fn validate(&self) -> DeskResult<()> {
        require_id("ticket_id", &self.ticket_id)?;
        require_text("note", &self.note)?;
        require_id("author_id", &self.author_id)?;
        Ok(())
    }
}

// ============================================================================
// RELATIONS
// ============================================================================

/// Time-bounded assignment of a device to a user.
///
/// Created with `end_date = None`; ending sets `end_date` once and for good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relation {
    pub id: RelationId,
    pub user: UserRef,
    pub device: DeviceRef,
    pub start_date: Timestamp,
    #[serde(default)]
    pub end_date: Option<Timestamp>,
}

impl Relation {
    pub fn is_active(&self) -> bool {
        self.end_date.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRelationRequest {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub start_date: Timestamp,
}

impl CreateRelationRequest {
    pub fn validate(&self) -> DeskResult<()> {
        require_id("user_id", &self.user_id)?;
        require_id("device_id", &self.device_id)?;
        Ok(())
    }
}

/// Whether a device currently has a holder. Derived from its relations,
/// never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationState {
    Unassigned,
    Assigned(RelationId),
}

impl RelationState {
    /// Derive the state from every relation recorded for one device.
    pub fn derive(relations: &[Relation]) -> Self {
        relations
            .iter()
            .find(|relation| relation.is_active())
            .map(|relation| RelationState::Assigned(relation.id))
            .unwrap_or(RelationState::Unassigned)
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, RelationState::Assigned(_))
    }
}
