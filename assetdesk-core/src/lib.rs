//! AssetDesk Core - Entity Types and List Protocol
//!
//! Data types, the error taxonomy, the filter codec that maps list state to a
//! navigable query string, the typed per-kind filter tables, and the traits
//! through which the client talks to its collaborators. No I/O happens here.

pub mod entities;
pub mod enums;
pub mod error;
pub mod filter;
pub mod identity;
pub mod page;
pub mod query;
pub mod traits;
pub mod views;

pub use entities::{
    CreateRelationRequest, Device, DeviceInsert, DeviceRef, DeviceUpdate, OperatorInfo,
    OperatorTicketsStats, Relation, RelationState, Ticket, TicketInsert, TicketRecord, TicketUpdate,
    TicketsStats, User, UserInsert, UserRef, UserUpdate, Worknote, WorknoteInsert,
};
pub use enums::{DeviceType, EnumParseError, InstallStatus, TicketStatus};
pub use error::{
    ConflictError, DeskError, DeskResult, ErrorKind, NetworkError, NotFoundError,
    ValidationError,
};
pub use filter::{EntityKind, FieldInput, FieldSpec, FilterSet, FilterValue, NULL_SENTINEL};
pub use identity::{
    DeviceId, EntityIdType, Principal, RelationId, TicketId, Timestamp, UserId, WorknoteId,
};
pub use page::{EntityRow, ListPage, PageMeta};
pub use query::{Filter, ListQuery, PAGE_KEY};
pub use traits::{ListSource, RelationRepository};
pub use views::{Mutation, ViewKey};
