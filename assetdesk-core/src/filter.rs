//! Typed filter model for entity lists
//!
//! Each [`EntityKind`] owns a static table of the field paths its list API
//! accepts. Paths are dot-addressable (`caller.email`) and are the exact keys
//! that travel in the query string. Filters built through [`FilterSet`] are
//! checked against the table before anything reaches the network.

use crate::query::{Filter, ListQuery, VALUE_SEPARATOR};
use crate::{DeviceType, DeskResult, InstallStatus, TicketStatus, ValidationError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Wire sentinel meaning "the field has no value".
pub const NULL_SENTINEL: &str = "null";

/// Date filters are exchanged as calendar days.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// The kinds of list the API serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Computer,
    Monitor,
    User,
    Ticket,
    Relation,
}

/// How a field is edited in a filter form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldInput {
    Text,
    Select(&'static [&'static str]),
    Date,
}

/// One filterable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub path: &'static str,
    pub label: &'static str,
    pub input: FieldInput,
    /// Whether `IsNull` is meaningful for this field.
    pub nullable: bool,
}

impl FieldSpec {
    const fn text(path: &'static str, label: &'static str) -> Self {
        Self {
            path,
            label,
            input: FieldInput::Text,
            nullable: false,
        }
    }

    const fn select(path: &'static str, label: &'static str, options: &'static [&'static str]) -> Self {
        Self {
            path,
            label,
            input: FieldInput::Select(options),
            nullable: false,
        }
    }

    const fn date(path: &'static str, label: &'static str) -> Self {
        Self {
            path,
            label,
            input: FieldInput::Date,
            nullable: false,
        }
    }

    const fn nullable(self) -> Self {
        Self {
            nullable: true,
            ..self
        }
    }

    /// Check a single OR token against the field's input kind.
    pub fn check_token(&self, kind: EntityKind, token: &str) -> Result<(), ValidationError> {
        if token == NULL_SENTINEL {
            return Err(ValidationError::invalid(
                self.path,
                format!("use IsNull to match missing values on {}", kind),
            ));
        }
        match self.input {
            FieldInput::Text => Ok(()),
            FieldInput::Select(options) => {
                if options.contains(&token) {
                    Ok(())
                } else {
                    Err(ValidationError::invalid(
                        self.path,
                        format!("{} is not one of {}", token, options.join(", ")),
                    ))
                }
            }
            FieldInput::Date => NaiveDate::parse_from_str(token, DATE_FORMAT)
                .map(|_| ())
                .map_err(|_| ValidationError::invalid(self.path, "expected a YYYY-MM-DD date")),
        }
    }
}

const INSTALL_STATUS_OPTIONS: &[&str] = &["in_inventory", "deployed", "end_of_life", "disposed"];
const TICKET_STATUS_OPTIONS: &[&str] = &["new", "on_hold", "in_progress", "resolved", "cancelled"];
const DEVICE_TYPE_OPTIONS: &[&str] = &["computer", "monitor"];

const DEVICE_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("serial_number", "Serial Number"),
    FieldSpec::text("model", "Model"),
    FieldSpec::text("order_id", "Order ID"),
    FieldSpec::select("install_status", "Install Status", INSTALL_STATUS_OPTIONS),
];

const USER_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("name", "Name"),
    FieldSpec::text("email", "Email"),
];

const TICKET_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("number", "Number"),
    FieldSpec::text("title", "Title"),
    FieldSpec::select("status", "Status", TICKET_STATUS_OPTIONS),
    FieldSpec::text("caller.email", "Caller Email"),
    FieldSpec::text("assigned_to.email", "Assigned To Email"),
    FieldSpec::text("assigned_to", "Assigned To").nullable(),
    FieldSpec::date("estimated_resolution_date", "Estimated Resolution Date").nullable(),
    FieldSpec::date("resolution_date", "Resolution Date").nullable(),
];

const RELATION_FIELDS: &[FieldSpec] = &[
    FieldSpec::text("user.email", "User Email"),
    FieldSpec::text("device.serial_number", "Device Serial Number"),
    FieldSpec::text("device.model", "Device Model"),
    FieldSpec::select("device.device_type", "Device Type", DEVICE_TYPE_OPTIONS),
    FieldSpec::date("start_date", "Start Date"),
    FieldSpec::date("end_date", "End Date").nullable(),
];

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Computer => "computer",
            EntityKind::Monitor => "monitor",
            EntityKind::User => "user",
            EntityKind::Ticket => "ticket",
            EntityKind::Relation => "relation",
        }
    }

    pub fn all() -> &'static [EntityKind] {
        &[
            EntityKind::Computer,
            EntityKind::Monitor,
            EntityKind::User,
            EntityKind::Ticket,
            EntityKind::Relation,
        ]
    }

    /// Path of the list endpoint, relative to the API base.
    pub fn collection_path(&self) -> &'static str {
        match self {
            EntityKind::Computer => "devices/computers",
            EntityKind::Monitor => "devices/monitors",
            EntityKind::User => "users",
            EntityKind::Ticket => "tickets",
            EntityKind::Relation => "relations",
        }
    }

    /// Key under `data` that holds the rows in a list response.
    pub fn rows_key(&self) -> &'static str {
        match self {
            EntityKind::Computer | EntityKind::Monitor => "devices",
            EntityKind::User => "users",
            EntityKind::Ticket => "tickets",
            EntityKind::Relation => "relations",
        }
    }

    pub fn fields(&self) -> &'static [FieldSpec] {
        match self {
            EntityKind::Computer | EntityKind::Monitor => DEVICE_FIELDS,
            EntityKind::User => USER_FIELDS,
            EntityKind::Ticket => TICKET_FIELDS,
            EntityKind::Relation => RELATION_FIELDS,
        }
    }

    pub fn field(&self, path: &str) -> Option<&'static FieldSpec> {
        self.fields().iter().find(|spec| spec.path == path)
    }

    /// Look up a field, failing with `UnknownField` when the path is not in
    /// this kind's table.
    pub fn require_field(&self, path: &str) -> Result<&'static FieldSpec, ValidationError> {
        self.field(path).ok_or_else(|| ValidationError::UnknownField {
            kind: *self,
            field: path.to_string(),
        })
    }

    pub fn field_paths(&self) -> Vec<&'static str> {
        self.fields().iter().map(|spec| spec.path).collect()
    }

    pub fn for_device_type(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::Computer => EntityKind::Computer,
            DeviceType::Monitor => EntityKind::Monitor,
        }
    }

    pub fn device_type(&self) -> Option<DeviceType> {
        match self {
            EntityKind::Computer => Some(DeviceType::Computer),
            EntityKind::Monitor => Some(DeviceType::Monitor),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        EntityKind::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == needle || kind.collection_path() == needle)
            .ok_or_else(|| ValidationError::invalid("kind", format!("unknown entity kind {}", s)))
    }
}

/// Value of one typed filter.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FilterValue {
    #[default]
    Unset,
    /// Matches any of the listed values.
    Is(Vec<String>),
    /// Matches rows where the field has no value.
    IsNull,
}

impl FilterValue {
    pub fn is(value: impl Into<String>) -> Self {
        FilterValue::Is(vec![value.into()])
    }

    pub fn any_of<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FilterValue::Is(values.into_iter().map(Into::into).collect())
    }

    pub fn install_status(status: InstallStatus) -> Self {
        FilterValue::is(status.as_str())
    }

    pub fn ticket_status(status: TicketStatus) -> Self {
        FilterValue::is(status.as_str())
    }

    /// Decode a raw parameter value. Blank reads as `Unset` and the exact
    /// sentinel as `IsNull`.
    pub fn from_wire(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return FilterValue::Unset;
        }
        if trimmed == NULL_SENTINEL {
            return FilterValue::IsNull;
        }
        let tokens: Vec<String> = trimmed
            .split(VALUE_SEPARATOR)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        if tokens.is_empty() {
            FilterValue::Unset
        } else {
            FilterValue::Is(tokens)
        }
    }

    /// Encode for the query string. `Unset` has no wire form.
    pub fn to_wire(&self) -> Option<String> {
        match self {
            FilterValue::Unset => None,
            FilterValue::IsNull => Some(NULL_SENTINEL.to_string()),
            FilterValue::Is(values) => {
                let tokens: Vec<&str> = values
                    .iter()
                    .map(|v| v.trim())
                    .filter(|v| !v.is_empty())
                    .collect();
                if tokens.is_empty() {
                    None
                } else {
                    Some(tokens.join(","))
                }
            }
        }
    }
}

static UNSET: FilterValue = FilterValue::Unset;

/// Filters for one entity kind, validated as they are set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSet {
    kind: EntityKind,
    criteria: Vec<(&'static str, FilterValue)>,
}

impl FilterSet {
    pub fn new(kind: EntityKind) -> Self {
        Self {
            kind,
            criteria: Vec::new(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Set a field's value. `Unset` removes the criterion.
    pub fn set(&mut self, path: &str, value: FilterValue) -> DeskResult<&mut Self> {
        let spec = self.kind.require_field(path)?;
        match &value {
            FilterValue::Unset => {
                self.criteria.retain(|(p, _)| *p != spec.path);
                return Ok(self);
            }
            FilterValue::IsNull if !spec.nullable => {
                return Err(ValidationError::invalid(
                    spec.path,
                    format!("{} is never empty on {}", spec.path, self.kind),
                )
                .into());
            }
            FilterValue::IsNull => {}
            FilterValue::Is(values) => {
                for token in values.iter().map(|v| v.trim()).filter(|v| !v.is_empty()) {
                    spec.check_token(self.kind, token)?;
                }
            }
        }

        match self.criteria.iter_mut().find(|(p, _)| *p == spec.path) {
            Some((_, existing)) => *existing = value,
            None => self.criteria.push((spec.path, value)),
        }
        Ok(self)
    }

    /// Builder form of [`FilterSet::set`].
    pub fn with(mut self, path: &str, value: FilterValue) -> DeskResult<Self> {
        self.set(path, value)?;
        Ok(self)
    }

    pub fn get(&self, path: &str) -> &FilterValue {
        self.criteria
            .iter()
            .find(|(p, _)| *p == path)
            .map(|(_, v)| v)
            .unwrap_or(&UNSET)
    }

    pub fn is_empty(&self) -> bool {
        self.to_filters().is_empty()
    }

    /// Wire filters in the order they were first set. Unset and empty
    /// values are skipped.
    pub fn to_filters(&self) -> Vec<Filter> {
        self.criteria
            .iter()
            .filter_map(|(path, value)| value.to_wire().map(|wire| Filter::new(*path, wire)))
            .collect()
    }

    pub fn to_query(&self, page: u32) -> ListQuery {
        ListQuery::from_filters(&self.to_filters(), page)
    }

    /// Rebuild a set from navigation state. Every parameter must be a field
    /// of `kind`.
    pub fn from_query(kind: EntityKind, query: &ListQuery) -> DeskResult<Self> {
        let mut set = FilterSet::new(kind);
        for filter in query.filters() {
            set.set(&filter.key, FilterValue::from_wire(&filter.value))?;
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeskError;

    #[test]
    fn test_kind_tables() {
        assert_eq!(EntityKind::Monitor.collection_path(), "devices/monitors");
        assert_eq!(EntityKind::Monitor.rows_key(), "devices");
        assert!(EntityKind::Ticket.field("caller.email").is_some());
        assert!(EntityKind::Ticket.field("priority").is_none());
        assert_eq!(
            EntityKind::Relation.field_paths(),
            vec![
                "user.email",
                "device.serial_number",
                "device.model",
                "device.device_type",
                "start_date",
                "end_date"
            ]
        );
    }

    #[test]
    fn test_kind_parses_from_name_or_path() {
        assert_eq!("ticket".parse::<EntityKind>().unwrap(), EntityKind::Ticket);
        assert_eq!(
            "devices/computers".parse::<EntityKind>().unwrap(),
            EntityKind::Computer
        );
        assert!("printers".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_filter_value_wire_forms() {
        assert_eq!(FilterValue::from_wire(""), FilterValue::Unset);
        assert_eq!(FilterValue::from_wire("null"), FilterValue::IsNull);
        assert_eq!(
            FilterValue::from_wire("new, open"),
            FilterValue::any_of(["new", "open"])
        );
        assert_eq!(FilterValue::IsNull.to_wire().as_deref(), Some("null"));
        assert_eq!(FilterValue::Is(vec![" ".into()]).to_wire(), None);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = FilterSet::new(EntityKind::Ticket)
            .with("priority", FilterValue::is("high"))
            .unwrap_err();
        assert!(matches!(
            err,
            DeskError::Validation(ValidationError::UnknownField {
                kind: EntityKind::Ticket,
                ..
            })
        ));
    }

    #[test]
    fn test_is_null_only_on_nullable_fields() {
        let mut set = FilterSet::new(EntityKind::Ticket);
        assert!(set.set("assigned_to", FilterValue::IsNull).is_ok());
        assert!(set.set("title", FilterValue::IsNull).is_err());
        assert_eq!(set.to_filters(), vec![Filter::new("assigned_to", "null")]);
    }

    #[test]
    fn test_select_and_date_tokens_checked() {
        let mut set = FilterSet::new(EntityKind::Computer);
        assert!(set
            .set("install_status", FilterValue::any_of(["deployed", "disposed"]))
            .is_ok());
        assert!(set.set("install_status", FilterValue::is("lost")).is_err());

        let mut rel = FilterSet::new(EntityKind::Relation);
        assert!(rel.set("start_date", FilterValue::is("2025-01-31")).is_ok());
        assert!(rel.set("start_date", FilterValue::is("31/01/2025")).is_err());
    }

    #[test]
    fn test_unset_removes_criterion() {
        let mut set = FilterSet::new(EntityKind::User);
        set.set("email", FilterValue::is("a@x.com")).unwrap();
        set.set("email", FilterValue::Unset).unwrap();
        assert!(set.is_empty());
        assert_eq!(set.get("email"), &FilterValue::Unset);
    }

    #[test]
    fn test_round_trip_through_query() {
        let set = FilterSet::new(EntityKind::Ticket)
            .with("status", FilterValue::any_of(["new", "on_hold"]))
            .unwrap()
            .with("caller.email", FilterValue::is("a@x.com"))
            .unwrap();
        let query = set.to_query(2);
        assert_eq!(
            query.to_query_string(),
            "status=new%2Con_hold&caller.email=a%40x.com&page=2"
        );
        let rebuilt = FilterSet::from_query(EntityKind::Ticket, &query).unwrap();
        assert_eq!(rebuilt, set);
    }
}
