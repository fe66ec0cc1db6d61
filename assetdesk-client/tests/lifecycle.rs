//! Relation lifecycle against the in-memory relation store.

use assetdesk_client::{Freshness, RelationLifecycle, RelationViews, RequestPolicy, ViewCache};
use assetdesk_core::{
    CreateRelationRequest, DeskError, DeskResult, DeviceId, EntityIdType, NetworkError, Relation,
    RelationId, RelationRepository, RelationState, UserId, ViewKey,
};
use assetdesk_test_utils::assertions::{
    assert_cancelled, assert_conflict, assert_timeout, assert_validation,
};
use assetdesk_test_utils::{fixtures, InMemoryRelationRepository, RepoOp};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    repo: Arc<InMemoryRelationRepository>,
    cache: Arc<ViewCache>,
    lifecycle: RelationLifecycle<InMemoryRelationRepository>,
    views: RelationViews<InMemoryRelationRepository>,
}

fn harness_with(repo: InMemoryRelationRepository, policy: RequestPolicy) -> Harness {
    let repo = Arc::new(repo);
    let cache = Arc::new(ViewCache::new());
    Harness {
        lifecycle: RelationLifecycle::new(repo.clone(), cache.clone(), policy.clone()),
        views: RelationViews::new(repo.clone(), cache.clone(), policy),
        repo,
        cache,
    }
}

/// Lists are read from the store when the request arrives and delivered
/// `delay` later, like a slow response from the server.
struct DelayedLists {
    inner: InMemoryRelationRepository,
    delay: Duration,
}

#[async_trait]
impl RelationRepository for DelayedLists {
    async fn list_by_device(&self, device_id: DeviceId) -> DeskResult<Vec<Relation>> {
        let snapshot = self.inner.list_by_device(device_id).await;
        tokio::time::sleep(self.delay).await;
        snapshot
    }

    async fn list_by_user(&self, user_id: UserId) -> DeskResult<Vec<Relation>> {
        let snapshot = self.inner.list_by_user(user_id).await;
        tokio::time::sleep(self.delay).await;
        snapshot
    }

    async fn has_active_relation(&self, device_id: DeviceId) -> DeskResult<bool> {
        self.inner.has_active_relation(device_id).await
    }

    async fn create(&self, request: &CreateRelationRequest) -> DeskResult<Relation> {
        self.inner.create(request).await
    }

    async fn end(&self, relation_id: RelationId) -> DeskResult<()> {
        self.inner.end(relation_id).await
    }
}

fn harness() -> Harness {
    harness_with(
        InMemoryRelationRepository::new(),
        RequestPolicy::new(Duration::from_secs(5)),
    )
}

#[tokio::test]
async fn test_active_relation_blocks_create_without_calling_store() {
    let h = harness();
    let holder = fixtures::user("Ada", "ada@example.com");
    let other = fixtures::user("Bob", "bob@example.com");
    let laptop = fixtures::computer("SN-001");
    h.repo.seed(fixtures::active_relation(&holder, &laptop));

    let result = h.lifecycle.create_relation(other.id, laptop.id, Utc::now()).await;

    assert_conflict(&result);
    assert_eq!(h.repo.calls(RepoOp::HasActive), 1);
    assert_eq!(h.repo.calls(RepoOp::Create), 0);
    assert_eq!(h.repo.active_for(laptop.id).len(), 1);
}

#[tokio::test]
async fn test_second_create_on_same_device_conflicts() {
    let h = harness();
    let ada = fixtures::user("Ada", "ada@example.com");
    let bob = fixtures::user("Bob", "bob@example.com");
    let laptop = fixtures::computer("SN-002");

    h.lifecycle
        .create_relation(ada.id, laptop.id, Utc::now())
        .await
        .unwrap();
    let second = h.lifecycle.create_relation(bob.id, laptop.id, Utc::now()).await;

    assert_conflict(&second);
    assert_eq!(h.repo.active_for(laptop.id)[0].user.id, ada.id);
}

#[tokio::test]
async fn test_end_then_create_succeeds() {
    let h = harness();
    let ada = fixtures::user("Ada", "ada@example.com");
    let bob = fixtures::user("Bob", "bob@example.com");
    let laptop = fixtures::computer("SN-003");
    let current = fixtures::active_relation(&ada, &laptop);
    h.repo.seed(current.clone());

    h.lifecycle
        .end_relation(current.id, Some(ada.id), Some(laptop.id))
        .await
        .unwrap();
    assert_eq!(
        h.views.derive_state(laptop.id, Freshness::Consistent).await.unwrap(),
        RelationState::Unassigned
    );

    let next = h
        .lifecycle
        .create_relation(bob.id, laptop.id, Utc::now())
        .await
        .unwrap();
    assert_eq!(
        h.views.derive_state(laptop.id, Freshness::Consistent).await.unwrap(),
        RelationState::Assigned(next.id)
    );
}

#[tokio::test]
async fn test_create_invalidates_both_parent_views() {
    let h = harness();
    let ada = fixtures::user("Ada", "ada@example.com");
    let monitor = fixtures::monitor("MN-001");
    h.views.by_user(ada.id, Freshness::Consistent).await.unwrap();
    h.views.by_device(monitor.id, Freshness::Consistent).await.unwrap();
    let mut invalidations = h.cache.subscribe();

    h.lifecycle
        .create_relation(ada.id, monitor.id, Utc::now())
        .await
        .unwrap();

    assert_eq!(h.cache.is_stale(ViewKey::UserRelations(ada.id), None), Some(true));
    assert_eq!(
        h.cache.is_stale(ViewKey::DeviceRelations(monitor.id), None),
        Some(true)
    );
    assert_eq!(invalidations.try_recv().unwrap(), ViewKey::UserRelations(ada.id));
    assert_eq!(
        invalidations.try_recv().unwrap(),
        ViewKey::DeviceRelations(monitor.id)
    );

    // A consistent read goes back to the store and sees the new relation.
    let listed = h.views.by_device(monitor.id, Freshness::Consistent).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(h.repo.calls(RepoOp::ListByDevice), 2);
}

#[tokio::test]
async fn test_best_effort_read_serves_stale_list() {
    let h = harness();
    let ada = fixtures::user("Ada", "ada@example.com");
    let laptop = fixtures::computer("SN-004");
    h.views.by_device(laptop.id, Freshness::Consistent).await.unwrap();

    h.lifecycle
        .create_relation(ada.id, laptop.id, Utc::now())
        .await
        .unwrap();

    let relaxed = Freshness::best_effort(Duration::from_secs(60));
    let served = h.views.by_device(laptop.id, relaxed).await.unwrap();
    assert!(served.is_empty());
    assert_eq!(h.repo.calls(RepoOp::ListByDevice), 1);
}

#[tokio::test]
async fn test_end_with_one_known_parent() {
    let h = harness();
    let ada = fixtures::user("Ada", "ada@example.com");
    let laptop = fixtures::computer("SN-005");
    let current = fixtures::active_relation(&ada, &laptop);
    h.repo.seed(current.clone());
    h.views.by_user(ada.id, Freshness::Consistent).await.unwrap();
    h.views.by_device(laptop.id, Freshness::Consistent).await.unwrap();

    h.lifecycle
        .end_relation(current.id, None, Some(laptop.id))
        .await
        .unwrap();

    assert_eq!(
        h.cache.is_stale(ViewKey::DeviceRelations(laptop.id), None),
        Some(true)
    );
    assert_eq!(h.cache.is_stale(ViewKey::UserRelations(ada.id), None), Some(false));
}

#[tokio::test]
async fn test_failed_end_leaves_state_and_cache_alone() {
    let h = harness();
    let ada = fixtures::user("Ada", "ada@example.com");
    let laptop = fixtures::computer("SN-006");
    let current = fixtures::active_relation(&ada, &laptop);
    h.repo.seed(current.clone());
    h.views.by_device(laptop.id, Freshness::Consistent).await.unwrap();
    h.repo.fail_next(
        RepoOp::End,
        NetworkError::Server {
            endpoint: "relations".to_string(),
            status: 502,
            message: "Bad Gateway".to_string(),
        }
        .into(),
    );

    let result = h
        .lifecycle
        .end_relation(current.id, Some(ada.id), Some(laptop.id))
        .await;

    assert!(matches!(result, Err(DeskError::Network(NetworkError::Server { status: 502, .. }))));
    assert_eq!(h.repo.active_for(laptop.id).len(), 1);
    assert_eq!(
        h.cache.is_stale(ViewKey::DeviceRelations(laptop.id), None),
        Some(false)
    );
}

#[tokio::test]
async fn test_store_constraint_catches_race_as_conflict() {
    let h = harness_with(
        InMemoryRelationRepository::new().with_unique_active_constraint(),
        RequestPolicy::new(Duration::from_secs(5)),
    );
    let ada = fixtures::user("Ada", "ada@example.com");
    let bob = fixtures::user("Bob", "bob@example.com");
    let laptop = fixtures::computer("SN-007");
    h.repo.seed(fixtures::active_relation(&ada, &laptop));
    // Another client committed after our check ran.
    h.repo.report_active(Some(false));

    let result = h.lifecycle.create_relation(bob.id, laptop.id, Utc::now()).await;

    assert_conflict(&result);
    assert_eq!(
        result.unwrap_err().to_string(),
        format!("Conflict: Device {} already has an active relation", laptop.id)
    );
    assert_eq!(h.repo.calls(RepoOp::Create), 1);
    assert_eq!(h.repo.active_for(laptop.id).len(), 1);
}

#[tokio::test]
async fn test_nil_ids_rejected_before_any_request() {
    let h = harness();
    let laptop = fixtures::computer("SN-008");

    let result = h
        .lifecycle
        .create_relation(UserId::nil(), laptop.id, Utc::now())
        .await;

    assert_validation(&result);
    assert_eq!(h.repo.calls(RepoOp::HasActive), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hung_check_times_out() {
    let h = harness_with(
        InMemoryRelationRepository::new().with_latency(Duration::from_secs(30)),
        RequestPolicy::new(Duration::from_millis(500)),
    );
    let ada = fixtures::user("Ada", "ada@example.com");
    let laptop = fixtures::computer("SN-009");

    let result = h.lifecycle.create_relation(ada.id, laptop.id, Utc::now()).await;

    assert_timeout(&result);
    assert_eq!(h.repo.calls(RepoOp::Create), 0);
    assert!(h.repo.relations().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancel_between_check_and_create_aborts_without_mutation() {
    let policy = RequestPolicy::new(Duration::from_secs(10));
    let h = harness_with(
        InMemoryRelationRepository::new().with_latency(Duration::from_millis(100)),
        policy.clone(),
    );
    let ada = fixtures::user("Ada", "ada@example.com");
    let laptop = fixtures::computer("SN-010");
    h.views.by_device(laptop.id, Freshness::Consistent).await.unwrap();

    // From here the check takes 100ms and the create would finish at 200ms.
    let token = policy.cancellation_token().clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        token.cancel();
    });

    let result = h.lifecycle.create_relation(ada.id, laptop.id, Utc::now()).await;

    assert_cancelled(&result);
    assert_eq!(h.repo.calls(RepoOp::HasActive), 1);
    assert!(h.repo.relations().is_empty());
    assert_eq!(
        h.cache.is_stale(ViewKey::DeviceRelations(laptop.id), None),
        Some(false)
    );
}

#[tokio::test]
async fn test_cancelled_policy_never_reaches_store() {
    let policy = RequestPolicy::new(Duration::from_secs(1));
    policy.cancel();
    let h = harness_with(InMemoryRelationRepository::new(), policy);
    let laptop = fixtures::computer("SN-011");

    let result = h.views.by_device(laptop.id, Freshness::Consistent).await;

    assert_cancelled(&result);
    assert_eq!(h.repo.calls(RepoOp::ListByDevice), 0);
    assert!(h
        .cache
        .get(ViewKey::DeviceRelations(laptop.id), None, Freshness::Consistent)
        .is_none());
}

#[tokio::test(start_paused = true)]
async fn test_read_in_flight_during_create_is_not_cached_as_fresh() {
    let repo = Arc::new(DelayedLists {
        inner: InMemoryRelationRepository::new(),
        delay: Duration::from_millis(100),
    });
    let cache = Arc::new(ViewCache::new());
    let policy = RequestPolicy::new(Duration::from_secs(5));
    let lifecycle = RelationLifecycle::new(repo.clone(), cache.clone(), policy.clone());
    let views = RelationViews::new(repo.clone(), cache.clone(), policy);
    let ada = fixtures::user("Ada", "ada@example.com");
    let laptop = fixtures::computer("SN-012");

    // The list request goes out first; the create commits while it is
    // still on the wire.
    let (before, created) = tokio::join!(
        views.by_device(laptop.id, Freshness::Consistent),
        async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            lifecycle.create_relation(ada.id, laptop.id, Utc::now()).await
        }
    );
    let created = created.unwrap();
    assert!(before.unwrap().is_empty());
    assert_eq!(repo.inner.active_for(laptop.id).len(), 1);
    assert_eq!(cache.is_stale(ViewKey::DeviceRelations(laptop.id), None), None);

    let after = views.by_device(laptop.id, Freshness::Consistent).await.unwrap();
    assert_eq!(after.len(), 1);
    assert_eq!(after[0].id, created.id);
    assert_eq!(repo.inner.calls(RepoOp::ListByDevice), 2);
}

#[tokio::test]
async fn test_read_started_after_create_is_cached() {
    let h = harness();
    let ada = fixtures::user("Ada", "ada@example.com");
    let laptop = fixtures::computer("SN-013");

    h.lifecycle
        .create_relation(ada.id, laptop.id, Utc::now())
        .await
        .unwrap();
    h.views.by_device(laptop.id, Freshness::Consistent).await.unwrap();
    h.views.by_device(laptop.id, Freshness::Consistent).await.unwrap();

    assert_eq!(
        h.cache.is_stale(ViewKey::DeviceRelations(laptop.id), None),
        Some(false)
    );
    assert_eq!(h.repo.calls(RepoOp::ListByDevice), 1);
}
