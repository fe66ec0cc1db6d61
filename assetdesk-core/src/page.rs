//! Paged list results

use crate::filter::EntityKind;
use crate::{Device, Relation, Ticket, User};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Paging metadata returned alongside every list page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMeta {
    pub count: u64,
    pub current_page: u32,
    pub total_pages: u32,
}

impl PageMeta {
    pub fn empty() -> Self {
        Self {
            count: 0,
            current_page: 1,
            total_pages: 0,
        }
    }

    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }

    pub fn next_page(&self) -> Option<u32> {
        self.has_next().then(|| self.current_page + 1)
    }

    pub fn previous_page(&self) -> Option<u32> {
        self.has_previous().then(|| self.current_page - 1)
    }
}

/// One page of rows plus its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListPage<T> {
    pub rows: Vec<T>,
    pub meta: PageMeta,
}

impl<T> ListPage<T> {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ListPage<U> {
        ListPage {
            rows: self.rows.into_iter().map(f).collect(),
            meta: self.meta,
        }
    }
}

/// A row from any entity list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityRow {
    Device(Device),
    User(User),
    Ticket(Ticket),
    Relation(Relation),
}

impl EntityRow {
    /// Decode a raw row for the given list kind.
    pub fn decode(kind: EntityKind, raw: Value) -> Result<Self, serde_json::Error> {
        Ok(match kind {
            EntityKind::Computer | EntityKind::Monitor => EntityRow::Device(serde_json::from_value(raw)?),
            EntityKind::User => EntityRow::User(serde_json::from_value(raw)?),
            EntityKind::Ticket => EntityRow::Ticket(serde_json::from_value(raw)?),
            EntityKind::Relation => EntityRow::Relation(serde_json::from_value(raw)?),
        })
    }

    pub fn id(&self) -> Uuid {
        use crate::EntityIdType;
        match self {
            EntityRow::Device(d) => d.id.as_uuid(),
            EntityRow::User(u) => u.id.as_uuid(),
            EntityRow::Ticket(t) => t.id.as_uuid(),
            EntityRow::Relation(r) => r.id.as_uuid(),
        }
    }

    /// Resolve a dot-addressed field path (`caller.email`) to display text.
    /// Missing links and nulls resolve to `None`.
    pub fn resolve(&self, path: &str) -> Option<String> {
        let value = serde_json::to_value(self).ok()?;
        let mut cursor = &value;
        for segment in path.split('.') {
            cursor = cursor.get(segment)?;
        }
        match cursor {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}
