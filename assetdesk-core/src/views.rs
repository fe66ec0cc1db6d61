//! Cached views and the writes that invalidate them
//!
//! [`Mutation::affected_views`] is the single place that knows which views a
//! write makes stale. Callers invalidate what it returns and nothing else.

use crate::filter::EntityKind;
use crate::{DeviceId, DeviceType, EntityIdType, RelationId, TicketId, UserId};
use std::fmt;
use uuid::Uuid;

/// Identity of a cached server-backed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKey {
    /// A paged entity list; each query string is a separate slot.
    List(EntityKind),
    /// One entity's detail view.
    Detail(EntityKind, Uuid),
    DeviceRelations(DeviceId),
    UserRelations(UserId),
    TicketWorknotes(TicketId),
    /// Ticket statistics.
    Dashboard,
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViewKey::List(kind) => write!(f, "list:{}", kind),
            ViewKey::Detail(kind, id) => write!(f, "detail:{}:{}", kind, id),
            ViewKey::DeviceRelations(id) => write!(f, "device-relations:{}", id),
            ViewKey::UserRelations(id) => write!(f, "user-relations:{}", id),
            ViewKey::TicketWorknotes(id) => write!(f, "ticket-worknotes:{}", id),
            ViewKey::Dashboard => f.write_str("dashboard"),
        }
    }
}

/// A committed write, described by what it touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    CreateRelation {
        relation_id: RelationId,
        user_id: UserId,
        device_id: DeviceId,
    },
    /// Ending a relation only invalidates the parent views the caller knows
    /// about.
    EndRelation {
        relation_id: RelationId,
        user_id: Option<UserId>,
        device_id: Option<DeviceId>,
    },
    CreateDevice(DeviceType),
    UpdateDevice(DeviceType, DeviceId),
    DeleteDevice(DeviceType, DeviceId),
    CreateUser,
    UpdateUser(UserId),
    DeleteUser(UserId),
    CreateTicket,
    UpdateTicket(TicketId),
    DeleteTicket(TicketId),
    AddWorknote(TicketId),
}

impl Mutation {
    pub fn affected_views(&self) -> Vec<ViewKey> {
        match *self {
            Mutation::CreateRelation {
                user_id, device_id, ..
            } => vec![
                ViewKey::UserRelations(user_id),
                ViewKey::DeviceRelations(device_id),
                ViewKey::List(EntityKind::Relation),
            ],
            Mutation::EndRelation {
                user_id, device_id, ..
            } => {
                let mut views = Vec::with_capacity(3);
                if let Some(user_id) = user_id {
                    views.push(ViewKey::UserRelations(user_id));
                }
                if let Some(device_id) = device_id {
                    views.push(ViewKey::DeviceRelations(device_id));
                }
                views.push(ViewKey::List(EntityKind::Relation));
                views
            }
            Mutation::CreateDevice(device_type) => {
                vec![ViewKey::List(EntityKind::for_device_type(device_type))]
            }
            Mutation::UpdateDevice(device_type, id) | Mutation::DeleteDevice(device_type, id) => {
                let kind = EntityKind::for_device_type(device_type);
                vec![
                    ViewKey::List(kind),
                    ViewKey::Detail(kind, id.as_uuid()),
                    ViewKey::DeviceRelations(id),
                    ViewKey::List(EntityKind::Relation),
                ]
            }
            Mutation::CreateUser => vec![ViewKey::List(EntityKind::User)],
            Mutation::UpdateUser(id) | Mutation::DeleteUser(id) => vec![
                ViewKey::List(EntityKind::User),
                ViewKey::Detail(EntityKind::User, id.as_uuid()),
                ViewKey::UserRelations(id),
                ViewKey::List(EntityKind::Relation),
                ViewKey::List(EntityKind::Ticket),
            ],
            Mutation::CreateTicket => vec![ViewKey::List(EntityKind::Ticket), ViewKey::Dashboard],
            Mutation::UpdateTicket(id) | Mutation::DeleteTicket(id) => vec![
                ViewKey::List(EntityKind::Ticket),
                ViewKey::Detail(EntityKind::Ticket, id.as_uuid()),
                ViewKey::Dashboard,
            ],
            Mutation::AddWorknote(id) => vec![ViewKey::TicketWorknotes(id)],
        }
    }
}
