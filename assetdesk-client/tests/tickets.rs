//! Ticket edits, worknotes, dashboard and inventory writes against an
//! in-memory store.

use assetdesk_client::{
    Freshness, Inventory, InventoryStore, RequestPolicy, TicketDesk, TicketStore, ViewCache,
};
use assetdesk_core::{
    DeskError, DeskResult, Device, DeviceId, DeviceInsert, DeviceType, DeviceUpdate, EntityIdType,
    EntityKind, InstallStatus, ListPage, OperatorInfo, OperatorTicketsStats, PageMeta, Principal,
    Ticket, TicketId, TicketInsert, TicketRecord, TicketStatus, TicketUpdate, TicketsStats, User,
    UserId, UserInsert, UserUpdate, ViewKey, Worknote, WorknoteId, WorknoteInsert,
};
use assetdesk_test_utils::assertions::{assert_not_found, assert_validation};
use assetdesk_test_utils::fixtures;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct FakeStore {
    tickets: Mutex<HashMap<TicketId, Ticket>>,
    worknotes: Mutex<Vec<WorknoteInsert>>,
    devices: Mutex<HashMap<DeviceId, Device>>,
    users: Mutex<HashMap<UserId, User>>,
    calls: Mutex<Vec<&'static str>>,
    fail_worknote: Mutex<bool>,
}

impl FakeStore {
    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| **c == call).count()
    }
}

fn record_of(ticket: &Ticket) -> TicketRecord {
    TicketRecord {
        id: ticket.id,
        number: ticket.number,
        title: ticket.title.clone(),
        description: ticket.description.clone(),
        status: ticket.status,
        caller_id: Some(ticket.caller.id),
        assigned_to: ticket.operator.as_ref().map(|op| op.id),
        estimated_resolution_date: ticket.estimated_resolution_date,
        resolution_date: ticket.resolution_date,
        created_at: ticket.created_at,
    }
}

#[async_trait]
impl TicketStore for FakeStore {
    async fn get_ticket(&self, id: TicketId) -> DeskResult<Ticket> {
        self.record("get_ticket");
        self.tickets
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| DeskError::not_found("ticket", id))
    }

    async fn create_ticket(&self, insert: &TicketInsert) -> DeskResult<TicketRecord> {
        self.record("create_ticket");
        Ok(TicketRecord {
            id: TicketId::generate(),
            number: 1,
            title: insert.title.clone(),
            description: insert.description.clone(),
            status: insert.status,
            caller_id: Some(insert.caller_id),
            assigned_to: insert.assigned_to,
            estimated_resolution_date: insert.estimated_resolution_date,
            resolution_date: None,
            created_at: Utc::now(),
        })
    }

    async fn update_ticket(&self, id: TicketId, update: &TicketUpdate) -> DeskResult<TicketRecord> {
        self.record("update_ticket");
        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets
            .get_mut(&id)
            .ok_or_else(|| DeskError::not_found("ticket", id))?;
        if let Some(status) = update.status {
            ticket.status = status;
        }
        if let Some(title) = &update.title {
            ticket.title = title.clone();
        }
        Ok(record_of(ticket))
    }

    async fn delete_ticket(&self, id: TicketId) -> DeskResult<()> {
        self.record("delete_ticket");
        self.tickets.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn list_worknotes(&self, ticket_id: TicketId) -> DeskResult<Vec<Worknote>> {
        self.record("list_worknotes");
        Ok(self
            .worknotes
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.ticket_id == ticket_id)
            .map(|w| Worknote {
                id: WorknoteId::generate(),
                ticket_id: w.ticket_id,
                note: w.note.clone(),
                author: None,
                created_at: Utc::now(),
            })
            .collect())
    }

    async fn add_worknote(&self, worknote: &WorknoteInsert) -> DeskResult<Worknote> {
        self.record("add_worknote");
        if *self.fail_worknote.lock().unwrap() {
            return Err(DeskError::not_found("ticket", worknote.ticket_id));
        }
        self.worknotes.lock().unwrap().push(worknote.clone());
        Ok(Worknote {
            id: WorknoteId::generate(),
            ticket_id: worknote.ticket_id,
            note: worknote.note.clone(),
            author: None,
            created_at: Utc::now(),
        })
    }

    async fn resolved_stats(&self) -> DeskResult<Vec<TicketsStats>> {
        self.record("resolved_stats");
        Ok(vec![TicketsStats {
            date: "2026-10-01".to_string(),
            count: 4,
        }])
    }

    async fn open_stats(&self) -> DeskResult<Vec<TicketsStats>> {
        self.record("open_stats");
        Ok(vec![TicketsStats {
            date: "2026-10-01".to_string(),
            count: 9,
        }])
    }

    async fn operator_stats(&self) -> DeskResult<Vec<OperatorTicketsStats>> {
        self.record("operator_stats");
        Ok(vec![OperatorTicketsStats {
            operator: OperatorInfo {
                id: None,
                name: None,
                email: None,
            },
            count: 2,
        }])
    }
}

#[async_trait]
impl InventoryStore for FakeStore {
    async fn get_device(&self, id: DeviceId) -> DeskResult<Device> {
        self.record("get_device");
        self.devices
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| DeskError::not_found("device", id))
    }

    async fn create_device(&self, insert: &DeviceInsert) -> DeskResult<Device> {
        self.record("create_device");
        let device = Device {
            id: DeviceId::generate(),
            device_type: insert.device_type,
            serial_number: insert.serial_number.clone(),
            model: insert.model.clone(),
            order_id: insert.order_id.clone(),
            install_status: insert.install_status,
            created_at: Some(Utc::now()),
        };
        self.devices.lock().unwrap().insert(device.id, device.clone());
        Ok(device)
    }

    async fn update_device(&self, id: DeviceId, update: &DeviceUpdate) -> DeskResult<Device> {
        self.record("update_device");
        let mut devices = self.devices.lock().unwrap();
        let device = devices
            .get_mut(&id)
            .ok_or_else(|| DeskError::not_found("device", id))?;
        if let Some(status) = update.install_status {
            device.install_status = status;
        }
        Ok(device.clone())
    }

    async fn delete_device(&self, id: DeviceId) -> DeskResult<()> {
        self.record("delete_device");
        self.devices.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn get_user(&self, id: UserId) -> DeskResult<User> {
        self.record("get_user");
        self.users
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| DeskError::not_found("user", id))
    }

    async fn create_user(&self, insert: &UserInsert) -> DeskResult<User> {
        self.record("create_user");
        let user = fixtures::user(&insert.name, &insert.email);
        self.users.lock().unwrap().insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_user(&self, id: UserId, update: &UserUpdate) -> DeskResult<User> {
        self.record("update_user");
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&id)
            .ok_or_else(|| DeskError::not_found("user", id))?;
        if let Some(name) = &update.name {
            user.name = name.clone();
        }
        Ok(user.clone())
    }

    async fn delete_user(&self, id: UserId) -> DeskResult<()> {
        self.record("delete_user");
        self.users.lock().unwrap().remove(&id);
        Ok(())
    }
}

fn policy() -> RequestPolicy {
    RequestPolicy::new(Duration::from_secs(5))
}

fn seeded_desk() -> (Arc<FakeStore>, Arc<ViewCache>, TicketDesk<FakeStore>, Ticket) {
    let store = Arc::new(FakeStore::default());
    let caller = fixtures::user("Ada", "ada@example.com");
    let ticket = fixtures::ticket(&caller);
    store.tickets.lock().unwrap().insert(ticket.id, ticket.clone());
    let cache = Arc::new(ViewCache::new());
    let desk = TicketDesk::new(store.clone(), cache.clone(), policy());
    (store, cache, desk, ticket)
}

#[tokio::test]
async fn test_update_records_worknote_as_principal() {
    let (store, _, desk, ticket) = seeded_desk();
    let operator = Principal::new(UserId::generate());
    let update = TicketUpdate {
        status: Some(TicketStatus::InProgress),
        ..Default::default()
    };

    let (record, note) = desk
        .update_with_worknote(operator, ticket.id, &update, "  Picked up, reimaging  ")
        .await
        .unwrap();

    assert_eq!(record.status, TicketStatus::InProgress);
    assert_eq!(note.note, "Picked up, reimaging");
    assert_eq!(store.calls(), vec!["update_ticket", "add_worknote"]);
    let recorded = store.worknotes.lock().unwrap()[0].clone();
    assert_eq!(recorded.author_id, operator.user_id);
    assert_eq!(recorded.ticket_id, ticket.id);
}

#[tokio::test]
async fn test_blank_worknote_rejected_before_update() {
    let (store, _, desk, ticket) = seeded_desk();
    let update = TicketUpdate {
        status: Some(TicketStatus::Resolved),
        ..Default::default()
    };

    let result = desk
        .update_with_worknote(Principal::new(UserId::generate()), ticket.id, &update, "   ")
        .await;

    assert_validation(&result);
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn test_update_invalidates_ticket_views() {
    let (_, cache, desk, ticket) = seeded_desk();
    desk.ticket(ticket.id, Freshness::Consistent).await.unwrap();
    desk.worknotes(ticket.id, Freshness::Consistent).await.unwrap();
    desk.dashboard(Freshness::Consistent).await.unwrap();

    desk.update_with_worknote(
        Principal::new(UserId::generate()),
        ticket.id,
        &TicketUpdate::default(),
        "No change, checked with caller",
    )
    .await
    .unwrap();

    let detail = ViewKey::Detail(EntityKind::Ticket, ticket.id.as_uuid());
    assert_eq!(cache.is_stale(detail, None), Some(true));
    assert_eq!(cache.is_stale(ViewKey::TicketWorknotes(ticket.id), None), Some(true));
    assert_eq!(cache.is_stale(ViewKey::Dashboard, None), Some(true));
}

#[tokio::test]
async fn test_failed_worknote_still_invalidates_updated_ticket() {
    let (store, cache, desk, ticket) = seeded_desk();
    desk.ticket(ticket.id, Freshness::Consistent).await.unwrap();
    *store.fail_worknote.lock().unwrap() = true;

    let result = desk
        .update_with_worknote(
            Principal::new(UserId::generate()),
            ticket.id,
            &TicketUpdate::default(),
            "Escalated",
        )
        .await;

    assert_not_found(&result, "ticket");
    let detail = ViewKey::Detail(EntityKind::Ticket, ticket.id.as_uuid());
    assert_eq!(cache.is_stale(detail, None), Some(true));
}

#[tokio::test]
async fn test_ticket_reads_through_cache() {
    let (store, _, desk, ticket) = seeded_desk();

    let first = desk.ticket(ticket.id, Freshness::Consistent).await.unwrap();
    let second = desk.ticket(ticket.id, Freshness::Consistent).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(store.count("get_ticket"), 1);
}

#[tokio::test]
async fn test_missing_ticket_is_not_found() {
    let (_, _, desk, _) = seeded_desk();

    let result = desk.ticket(TicketId::generate(), Freshness::Consistent).await;

    assert_not_found(&result, "ticket");
}

#[tokio::test]
async fn test_dashboard_loads_all_stats_once() {
    let (store, _, desk, _) = seeded_desk();

    let stats = desk.dashboard(Freshness::Consistent).await.unwrap();
    desk.dashboard(Freshness::Consistent).await.unwrap();

    assert_eq!(stats.resolved[0].count, 4);
    assert_eq!(stats.open[0].count, 9);
    assert_eq!(stats.operators[0].count, 2);
    assert_eq!(store.count("open_stats"), 1);
}

#[tokio::test]
async fn test_create_ticket_requires_title() {
    let (store, _, desk, _) = seeded_desk();
    let insert = TicketInsert {
        title: " ".to_string(),
        description: None,
        status: TicketStatus::New,
        caller_id: UserId::generate(),
        assigned_to: None,
        estimated_resolution_date: None,
    };

    let result = desk.create(&insert).await;

    assert_validation(&result);
    assert_eq!(store.count("create_ticket"), 0);
}

#[tokio::test]
async fn test_device_update_invalidates_device_and_relation_views() {
    let store = Arc::new(FakeStore::default());
    let cache = Arc::new(ViewCache::new());
    let inventory = Inventory::new(store.clone(), cache.clone(), policy());
    let device = inventory
        .create_device(&DeviceInsert {
            device_type: DeviceType::Monitor,
            serial_number: "MN-42".to_string(),
            model: "P2723D".to_string(),
            order_id: "PO-7".to_string(),
            install_status: InstallStatus::InInventory,
        })
        .await
        .unwrap();
    inventory.device(device.id, Freshness::Consistent).await.unwrap();
    let relations = ViewKey::DeviceRelations(device.id);
    cache.store(
        cache.watermark(relations),
        None,
        assetdesk_client::CachedView::Relations(Vec::new()),
    );
    for kind in [EntityKind::Monitor, EntityKind::Computer] {
        let list = ViewKey::List(kind);
        cache.store(
            cache.watermark(list),
            Some("page=1"),
            assetdesk_client::CachedView::Page(ListPage {
                rows: Vec::new(),
                meta: PageMeta::empty(),
            }),
        );
    }

    let updated = inventory
        .update_device(
            device.id,
            &DeviceUpdate {
                install_status: Some(InstallStatus::Deployed),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.install_status, InstallStatus::Deployed);
    let detail = ViewKey::Detail(EntityKind::Monitor, device.id.as_uuid());
    assert_eq!(cache.is_stale(detail, None), Some(true));
    assert_eq!(cache.is_stale(relations, None), Some(true));
    // The returned row decides which list is touched.
    assert_eq!(
        cache.is_stale(ViewKey::List(EntityKind::Monitor), Some("page=1")),
        Some(true)
    );
    assert_eq!(
        cache.is_stale(ViewKey::List(EntityKind::Computer), Some("page=1")),
        Some(false)
    );
}

#[tokio::test]
async fn test_empty_device_update_is_rejected() {
    let store = Arc::new(FakeStore::default());
    let inventory = Inventory::new(store.clone(), Arc::new(ViewCache::new()), policy());

    let result = inventory
        .update_device(DeviceId::generate(), &DeviceUpdate::default())
        .await;

    assert_validation(&result);
    assert_eq!(store.count("update_device"), 0);
}

#[tokio::test]
async fn test_user_lifecycle_through_inventory() {
    let store = Arc::new(FakeStore::default());
    let inventory = Inventory::new(store.clone(), Arc::new(ViewCache::new()), policy());

    let user = inventory
        .create_user(&UserInsert {
            name: "Grace".to_string(),
            email: "grace@example.com".to_string(),
        })
        .await
        .unwrap();
    let renamed = inventory
        .update_user(
            user.id,
            &UserUpdate {
                name: Some("Grace H.".to_string()),
                email: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.name, "Grace H.");

    inventory.delete_user(user.id).await.unwrap();
    let gone = inventory.user(user.id, Freshness::Consistent).await;
    assert_not_found(&gone, "user");
}
