//! Relation Lifecycle Controller.
//!
//! A device is Unassigned until a relation is created for it and Assigned
//! until that relation is ended. Creation is check-then-act: the active
//! check short-circuits the common conflict, and the store's uniqueness
//! constraint is authoritative for the race the check cannot close.

use crate::cache::{CachedView, Freshness, ViewCache};
use crate::error::log_failure;
use crate::policy::RequestPolicy;
use assetdesk_core::{
    ConflictError, CreateRelationRequest, DeskError, DeskResult, DeviceId, Mutation, Relation,
    RelationId, RelationRepository, RelationState, Timestamp, UserId, ViewKey,
};
use std::sync::Arc;

const RELATIONS_ENDPOINT: &str = "relations";

pub struct RelationLifecycle<R> {
    repository: Arc<R>,
    cache: Arc<ViewCache>,
    policy: RequestPolicy,
}

impl<R: RelationRepository> RelationLifecycle<R> {
    pub fn new(repository: Arc<R>, cache: Arc<ViewCache>, policy: RequestPolicy) -> Self {
        Self {
            repository,
            cache,
            policy,
        }
    }

    /// Assign `device_id` to `user_id` from `start_date`.
    ///
    /// Fails with a conflict, without creating anything, when the device
    /// already has an active relation. On success both parents' relation
    /// views are invalidated.
    pub async fn create_relation(
        &self,
        user_id: UserId,
        device_id: DeviceId,
        start_date: Timestamp,
    ) -> DeskResult<Relation> {
        let request = CreateRelationRequest {
            user_id,
            device_id,
            start_date,
        };
        request
            .validate()
            .inspect_err(|err| log_failure("create relation", err))?;

        let active = self
            .policy
            .run(
                RELATIONS_ENDPOINT,
                self.repository.has_active_relation(device_id),
            )
            .await
            .inspect_err(|err| log_failure("create relation", err))?;
        if active {
            let err = DeskError::from(ConflictError::ActiveRelationExists { device_id });
            log_failure("create relation", &err);
            return Err(err);
        }

        let relation = self
            .policy
            .run(RELATIONS_ENDPOINT, self.repository.create(&request))
            .await
            .map_err(|err| authoritative_conflict(err, device_id))
            .inspect_err(|err| log_failure("create relation", err))?;

        self.cache.apply(&Mutation::CreateRelation {
            relation_id: relation.id,
            user_id,
            device_id,
        });
        tracing::info!(relation_id = %relation.id, %user_id, %device_id, "Relation created");
        Ok(relation)
    }

    /// End `relation_id` and invalidate whichever parent views the caller
    /// knows about.
    pub async fn end_relation(
        &self,
        relation_id: RelationId,
        user_id: Option<UserId>,
        device_id: Option<DeviceId>,
    ) -> DeskResult<()> {
        self.policy
            .run(RELATIONS_ENDPOINT, self.repository.end(relation_id))
            .await
            .inspect_err(|err| log_failure("end relation", err))?;

        self.cache.apply(&Mutation::EndRelation {
            relation_id,
            user_id,
            device_id,
        });
        tracing::info!(%relation_id, user_id = ?user_id, device_id = ?device_id, "Relation ended");
        Ok(())
    }
}

/// A store-side uniqueness rejection is the same conflict the pre-check
/// reports.
fn authoritative_conflict(err: DeskError, device_id: DeviceId) -> DeskError {
    match err {
        DeskError::Conflict(ConflictError::Rejected { .. }) => {
            ConflictError::ActiveRelationExists { device_id }.into()
        }
        other => other,
    }
}

/// Read side of relations: per-parent lists and the derived device state.
pub struct RelationViews<R> {
    repository: Arc<R>,
    cache: Arc<ViewCache>,
    policy: RequestPolicy,
}

impl<R: RelationRepository> RelationViews<R> {
    pub fn new(repository: Arc<R>, cache: Arc<ViewCache>, policy: RequestPolicy) -> Self {
        Self {
            repository,
            cache,
            policy,
        }
    }

    pub async fn by_device(&self, device_id: DeviceId, freshness: Freshness) -> DeskResult<Vec<Relation>> {
        let key = ViewKey::DeviceRelations(device_id);
        if let Some(hit) = self.cached(key, freshness) {
            return Ok(hit);
        }
        let since = self.cache.watermark(key);
        let relations = self
            .policy
            .run(RELATIONS_ENDPOINT, self.repository.list_by_device(device_id))
            .await
            .inspect_err(|err| log_failure("list device relations", err))?;
        self.cache
            .store(since, None, CachedView::Relations(relations.clone()));
        Ok(relations)
    }

    pub async fn by_user(&self, user_id: UserId, freshness: Freshness) -> DeskResult<Vec<Relation>> {
        let key = ViewKey::UserRelations(user_id);
        if let Some(hit) = self.cached(key, freshness) {
            return Ok(hit);
        }
        let since = self.cache.watermark(key);
        let relations = self
            .policy
            .run(RELATIONS_ENDPOINT, self.repository.list_by_user(user_id))
            .await
            .inspect_err(|err| log_failure("list user relations", err))?;
        self.cache
            .store(since, None, CachedView::Relations(relations.clone()));
        Ok(relations)
    }

    /// Whether the device is currently held, derived from its relations.
    pub async fn derive_state(&self, device_id: DeviceId, freshness: Freshness) -> DeskResult<RelationState> {
        let relations = self.by_device(device_id, freshness).await?;
        Ok(RelationState::derive(&relations))
    }

    fn cached(&self, key: ViewKey, freshness: Freshness) -> Option<Vec<Relation>> {
        self.cache
            .get(key, None, freshness)?
            .filter_map(|view| match view {
                CachedView::Relations(relations) => Some(relations),
                _ => None,
            })
            .map(|hit| hit.into_value())
    }
}
