//! Collaborator seams
//!
//! The list API and the relation store are consumed, never reimplemented.
//! These traits are what the client logic is written against; the HTTP
//! client implements both and the test utilities provide in-memory fakes.

use crate::{CreateRelationRequest, DeskResult, DeviceId, Relation, RelationId, UserId};
use async_trait::async_trait;
use serde_json::Value;

/// Raw access to the paged list endpoints.
#[async_trait]
pub trait ListSource: Send + Sync {
    /// Fetch `GET /<collection>?<params>` and return the decoded JSON body.
    ///
    /// `params` already contains the page parameter; implementations send
    /// them as given, in order.
    async fn fetch_list(&self, collection: &str, params: &[(String, String)]) -> DeskResult<Value>;
}

/// Relation store operations.
#[async_trait]
pub trait RelationRepository: Send + Sync {
    async fn list_by_device(&self, device_id: DeviceId) -> DeskResult<Vec<Relation>>;

    async fn list_by_user(&self, user_id: UserId) -> DeskResult<Vec<Relation>>;

    /// Whether the device currently has a relation with no end date.
    async fn has_active_relation(&self, device_id: DeviceId) -> DeskResult<bool>;

    /// Commit a new relation. Stores that enforce uniqueness report a
    /// violation as a conflict.
    async fn create(&self, request: &CreateRelationRequest) -> DeskResult<Relation>;

    /// Set the relation's end date to now, server-side.
    async fn end(&self, relation_id: RelationId) -> DeskResult<()>;
}
