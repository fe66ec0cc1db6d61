//! AssetDesk Test Utilities
//!
//! Shared test infrastructure for the AssetDesk workspace:
//! - In-memory collaborators standing in for the remote API
//! - Proptest generators for entity and filter types
//! - Test fixtures for common scenarios
//! - Custom assertions over `DeskResult`

pub use assetdesk_core::{
    ConflictError, CreateRelationRequest, DeskError, DeskResult, Device, DeviceId, DeviceRef,
    DeviceType, EntityIdType, EntityKind, FieldInput, FieldSpec, Filter, FilterSet, FilterValue,
    InstallStatus, ListQuery, ListSource, NetworkError, NotFoundError, PageMeta, Relation,
    RelationId, RelationRepository, Ticket, TicketId, TicketStatus, Timestamp, User, UserId,
    UserRef, ValidationError, WorknoteId,
};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// IN-MEMORY RELATION STORE
// ============================================================================

/// Relation store operations, for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoOp {
    ListByDevice,
    ListByUser,
    HasActive,
    Create,
    End,
}

#[derive(Debug, Default)]
struct RepoState {
    relations: Vec<Relation>,
    users: HashMap<UserId, UserRef>,
    devices: HashMap<DeviceId, DeviceRef>,
    failures: HashMap<RepoOp, DeskError>,
    reported_active: Option<bool>,
    calls: HashMap<RepoOp, usize>,
}

/// In-memory `RelationRepository`.
///
/// By default it behaves like the real store without a uniqueness
/// constraint: `create` commits whatever it is given. Enable the constraint
/// with [`InMemoryRelationRepository::with_unique_active_constraint`].
#[derive(Debug, Clone, Default)]
pub struct InMemoryRelationRepository {
    state: Arc<Mutex<RepoState>>,
    unique_active: bool,
    latency: Option<Duration>,
}

impl InMemoryRelationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject a create when the device already has an active relation.
    pub fn with_unique_active_constraint(mut self) -> Self {
        self.unique_active = true;
        self
    }

    /// Delay every operation, for deadline and cancellation tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn register_user(&self, user: &User) {
        lock(&self.state).users.insert(user.id, UserRef::from(user));
    }

    pub fn register_device(&self, device: &Device) {
        lock(&self.state)
            .devices
            .insert(device.id, DeviceRef::from(device));
    }

    /// Insert a relation directly, bypassing every check.
    pub fn seed(&self, relation: Relation) {
        lock(&self.state).relations.push(relation);
    }

    pub fn relations(&self) -> Vec<Relation> {
        lock(&self.state).relations.clone()
    }

    pub fn active_for(&self, device_id: DeviceId) -> Vec<Relation> {
        lock(&self.state)
            .relations
            .iter()
            .filter(|r| r.device.id == device_id && r.is_active())
            .cloned()
            .collect()
    }

    /// Fail the next call of `op` with `error`.
    pub fn fail_next(&self, op: RepoOp, error: DeskError) {
        lock(&self.state).failures.insert(op, error);
    }

    /// Make `has_active_relation` answer `active` regardless of stored state.
    /// Simulates another client committing between check and create.
    pub fn report_active(&self, active: Option<bool>) {
        lock(&self.state).reported_active = active;
    }

    pub fn calls(&self, op: RepoOp) -> usize {
        lock(&self.state).calls.get(&op).copied().unwrap_or(0)
    }

    async fn enter(&self, op: RepoOp) -> DeskResult<()> {
        {
            let mut state = lock(&self.state);
            *state.calls.entry(op).or_insert(0) += 1;
        }
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match lock(&self.state).failures.remove(&op) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RelationRepository for InMemoryRelationRepository {
    async fn list_by_device(&self, device_id: DeviceId) -> DeskResult<Vec<Relation>> {
        self.enter(RepoOp::ListByDevice).await?;
        Ok(lock(&self.state)
            .relations
            .iter()
            .filter(|r| r.device.id == device_id)
            .cloned()
            .collect())
    }

    async fn list_by_user(&self, user_id: UserId) -> DeskResult<Vec<Relation>> {
        self.enter(RepoOp::ListByUser).await?;
        Ok(lock(&self.state)
            .relations
            .iter()
            .filter(|r| r.user.id == user_id)
            .cloned()
            .collect())
    }

    async fn has_active_relation(&self, device_id: DeviceId) -> DeskResult<bool> {
        self.enter(RepoOp::HasActive).await?;
        let state = lock(&self.state);
        if let Some(active) = state.reported_active {
            return Ok(active);
        }
        Ok(state
            .relations
            .iter()
            .any(|r| r.device.id == device_id && r.is_active()))
    }

    async fn create(&self, request: &CreateRelationRequest) -> DeskResult<Relation> {
        self.enter(RepoOp::Create).await?;
        let mut state = lock(&self.state);
        if self.unique_active
            && state
                .relations
                .iter()
                .any(|r| r.device.id == request.device_id && r.is_active())
        {
            return Err(ConflictError::Rejected {
                operation: "create relation".to_string(),
                message: "duplicate key value violates unique constraint".to_string(),
            }
            .into());
        }

        let user = state.users.get(&request.user_id).cloned().unwrap_or(UserRef {
            id: request.user_id,
            email: None,
            name: None,
        });
        let device = state
            .devices
            .get(&request.device_id)
            .cloned()
            .unwrap_or(DeviceRef {
                id: request.device_id,
                serial_number: None,
                model: None,
                device_type: None,
                order_id: None,
            });
        let relation = Relation {
            id: RelationId::generate(),
            user,
            device,
            start_date: request.start_date,
            end_date: None,
        };
        state.relations.push(relation.clone());
        Ok(relation)
    }

    async fn end(&self, relation_id: RelationId) -> DeskResult<()> {
        self.enter(RepoOp::End).await?;
        let mut state = lock(&self.state);
        let relation = state
            .relations
            .iter_mut()
            .find(|r| r.id == relation_id)
            .ok_or_else(|| DeskError::not_found("relation", relation_id))?;
        if relation.end_date.is_some() {
            return Err(ConflictError::Rejected {
                operation: "end relation".to_string(),
                message: "relation already ended".to_string(),
            }
            .into());
        }
        relation.end_date = Some(Utc::now());
        Ok(())
    }
}

// ============================================================================
// RECORDING LIST SOURCE
// ============================================================================

/// One recorded list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListCall {
    pub collection: String,
    pub params: Vec<(String, String)>,
}

impl ListCall {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// `ListSource` that serves canned bodies and records every request.
///
/// Collections without a canned body get an empty page.
#[derive(Debug, Default)]
pub struct RecordingListSource {
    responses: Mutex<HashMap<String, Value>>,
    failure: Mutex<Option<DeskError>>,
    calls: Mutex<Vec<ListCall>>,
    latency: Option<Duration>,
}

impl RecordingListSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn respond(&self, collection: &str, body: Value) {
        lock(&self.responses).insert(collection.to_string(), body);
    }

    pub fn fail_next(&self, error: DeskError) {
        *lock(&self.failure) = Some(error);
    }

    pub fn calls(&self) -> Vec<ListCall> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    pub fn last_call(&self) -> Option<ListCall> {
        lock(&self.calls).last().cloned()
    }
}

#[async_trait]
impl ListSource for RecordingListSource {
    async fn fetch_list(&self, collection: &str, params: &[(String, String)]) -> DeskResult<Value> {
        lock(&self.calls).push(ListCall {
            collection: collection.to_string(),
            params: params.to_vec(),
        });
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = lock(&self.failure).take() {
            return Err(err);
        }
        if let Some(body) = lock(&self.responses).get(collection) {
            return Ok(body.clone());
        }
        let rows_key = collection
            .parse::<EntityKind>()
            .map(|kind| kind.rows_key())
            .unwrap_or("rows");
        Ok(fixtures::list_envelope(rows_key, Vec::new(), PageMeta::empty()))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for AssetDesk types.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_device_id() -> impl Strategy<Value = DeviceId> {
        arb_uuid().prop_map(DeviceId::new)
    }

    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        arb_uuid().prop_map(UserId::new)
    }

    pub fn arb_relation_id() -> impl Strategy<Value = RelationId> {
        arb_uuid().prop_map(RelationId::new)
    }

    pub fn arb_ticket_id() -> impl Strategy<Value = TicketId> {
        arb_uuid().prop_map(TicketId::new)
    }

    /// Timestamps within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1577836800i64..1893456000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now)
        })
    }

    pub fn arb_device_type() -> impl Strategy<Value = DeviceType> {
        prop::sample::select(DeviceType::all())
    }

    pub fn arb_install_status() -> impl Strategy<Value = InstallStatus> {
        prop::sample::select(InstallStatus::all())
    }

    pub fn arb_ticket_status() -> impl Strategy<Value = TicketStatus> {
        prop::sample::select(TicketStatus::all())
    }

    pub fn arb_entity_kind() -> impl Strategy<Value = EntityKind> {
        prop::sample::select(EntityKind::all())
    }

    /// A token valid for the field's input kind.
    pub fn arb_token_for(spec: &'static FieldSpec) -> BoxedStrategy<String> {
        match spec.input {
            FieldInput::Text => "[a-z0-9@.]{1,10}"
                .prop_filter("null is the wire sentinel", |t| t != "null")
                .boxed(),
            FieldInput::Select(options) => prop::sample::select(options)
                .prop_map(str::to_string)
                .boxed(),
            FieldInput::Date => (2020i32..2030, 1u32..13, 1u32..29)
                .prop_map(|(y, m, d)| format!("{:04}-{:02}-{:02}", y, m, d))
                .boxed(),
        }
    }

    /// A legal value for the field, including `IsNull` on nullable fields.
    pub fn arb_filter_value_for(spec: &'static FieldSpec) -> BoxedStrategy<FilterValue> {
        let tokens = prop::collection::vec(arb_token_for(spec), 1..4).prop_map(|mut tokens| {
            tokens.dedup();
            FilterValue::Is(tokens)
        });
        if spec.nullable {
            prop_oneof![4 => tokens, 1 => Just(FilterValue::IsNull)].boxed()
        } else {
            tokens.boxed()
        }
    }

    /// Wire filters whose keys are legal for `kind`, unique by key.
    pub fn arb_filters(kind: EntityKind) -> impl Strategy<Value = Vec<Filter>> {
        let fields = kind.fields();
        prop::sample::subsequence(fields.iter().collect::<Vec<_>>(), 0..=fields.len())
            .prop_flat_map(|specs| {
                specs
                    .into_iter()
                    .map(|spec| {
                        arb_filter_value_for(spec).prop_map(move |value| {
                            Filter::new(spec.path, value.to_wire().unwrap_or_default())
                        })
                    })
                    .collect::<Vec<_>>()
            })
    }

    pub fn arb_list_query(kind: EntityKind) -> impl Strategy<Value = ListQuery> {
        (arb_filters(kind), 1u32..500)
            .prop_map(|(filters, page)| ListQuery::from_filters(&filters, page))
    }

    pub fn arb_user_ref() -> impl Strategy<Value = UserRef> {
        (arb_user_id(), "[a-z]{1,8}").prop_map(|(id, local)| UserRef {
            id,
            email: Some(format!("{}@example.com", local)),
            name: Some(local),
        })
    }

    pub fn arb_device_ref() -> impl Strategy<Value = DeviceRef> {
        (arb_device_id(), "[A-Z0-9]{6,10}", arb_device_type()).prop_map(
            |(id, serial, device_type)| DeviceRef {
                id,
                serial_number: Some(serial),
                model: Some("Model".to_string()),
                device_type: Some(device_type),
                order_id: None,
            },
        )
    }

    pub fn arb_relation() -> impl Strategy<Value = Relation> {
        (
            arb_relation_id(),
            arb_user_ref(),
            arb_device_ref(),
            arb_timestamp(),
            prop::option::of(0i64..86_400 * 365),
        )
            .prop_map(|(id, user, device, start_date, ended_after)| Relation {
                id,
                user,
                device,
                start_date,
                end_date: ended_after.map(|secs| start_date + chrono::Duration::seconds(secs)),
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built entities and response bodies.

    use super::*;

    pub fn user(name: &str, email: &str) -> User {
        User {
            id: UserId::generate(),
            name: name.to_string(),
            email: email.to_string(),
            created_at: Some(Utc::now()),
        }
    }

    fn device(device_type: DeviceType, serial: &str) -> Device {
        Device {
            id: DeviceId::generate(),
            device_type,
            serial_number: serial.to_string(),
            model: "Latitude 7440".to_string(),
            order_id: "PO-1001".to_string(),
            install_status: InstallStatus::InInventory,
            created_at: Some(Utc::now()),
        }
    }

    pub fn computer(serial: &str) -> Device {
        device(DeviceType::Computer, serial)
    }

    pub fn monitor(serial: &str) -> Device {
        Device {
            model: "P2723D".to_string(),
            ..device(DeviceType::Monitor, serial)
        }
    }

    pub fn ticket(caller: &User) -> Ticket {
        Ticket {
            id: TicketId::generate(),
            number: 1001,
            title: "Laptop does not boot".to_string(),
            description: Some("Black screen after BIOS logo".to_string()),
            status: TicketStatus::New,
            caller: UserRef::from(caller),
            operator: None,
            estimated_resolution_date: None,
            resolution_date: None,
            created_at: Utc::now(),
        }
    }

    pub fn active_relation(user: &User, device: &Device) -> Relation {
        Relation {
            id: RelationId::generate(),
            user: UserRef::from(user),
            device: DeviceRef::from(device),
            start_date: Utc::now() - chrono::Duration::days(30),
            end_date: None,
        }
    }

    pub fn ended_relation(user: &User, device: &Device) -> Relation {
        let relation = active_relation(user, device);
        Relation {
            end_date: Some(relation.start_date + chrono::Duration::days(7)),
            ..relation
        }
    }

    pub fn page_meta(count: u64, current_page: u32, total_pages: u32) -> PageMeta {
        PageMeta {
            count,
            current_page,
            total_pages,
        }
    }

    /// `{data: {<rows_key>: rows, meta}}`, the list response envelope.
    pub fn list_envelope(rows_key: &str, rows: Vec<Value>, meta: PageMeta) -> Value {
        let mut data = serde_json::Map::new();
        data.insert(rows_key.to_string(), Value::Array(rows));
        data.insert("meta".to_string(), json!(meta));
        json!({ "data": Value::Object(data) })
    }

    pub fn ticket_json(ticket: &Ticket) -> Value {
        serde_json::to_value(ticket).unwrap_or(Value::Null)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over `DeskResult` classifications.

    use super::*;

    #[track_caller]
    pub fn assert_conflict<T: std::fmt::Debug>(result: &DeskResult<T>) {
        match result {
            Err(DeskError::Conflict(_)) => {}
            other => panic!("Expected Conflict error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_validation<T: std::fmt::Debug>(result: &DeskResult<T>) {
        match result {
            Err(DeskError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_unknown_field<T: std::fmt::Debug>(result: &DeskResult<T>, expected_field: &str) {
        match result {
            Err(DeskError::Validation(ValidationError::UnknownField { field, .. })) => {
                assert_eq!(field, expected_field, "Unexpected field in UnknownField");
            }
            other => panic!("Expected UnknownField error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &DeskResult<T>, entity: &str) {
        match result {
            Err(DeskError::NotFound(err)) => {
                assert_eq!(err.entity, entity, "NotFound for unexpected entity");
            }
            other => panic!("Expected NotFound error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_timeout<T: std::fmt::Debug>(result: &DeskResult<T>) {
        match result {
            Err(DeskError::Network(NetworkError::Timeout { .. })) => {}
            other => panic!("Expected Timeout error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_cancelled<T: std::fmt::Debug>(result: &DeskResult<T>) {
        match result {
            Err(DeskError::Network(NetworkError::Cancelled { .. })) => {}
            other => panic!("Expected Cancelled error, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assetdesk_core::RelationState;
    use proptest::prelude::*;

    fn request_for(user: &User, device: &Device) -> CreateRelationRequest {
        CreateRelationRequest {
            user_id: user.id,
            device_id: device.id,
            start_date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_repository_create_then_end() {
        let repo = InMemoryRelationRepository::new();
        let user = fixtures::user("Ada", "ada@example.com");
        let device = fixtures::computer("SN-1");
        repo.register_user(&user);
        repo.register_device(&device);

        let relation = repo.create(&request_for(&user, &device)).await.unwrap();
        assert_eq!(relation.user.email.as_deref(), Some("ada@example.com"));
        assert!(repo.has_active_relation(device.id).await.unwrap());

        repo.end(relation.id).await.unwrap();
        assert!(!repo.has_active_relation(device.id).await.unwrap());
        let listed = repo.list_by_device(device.id).await.unwrap();
        assert_eq!(RelationState::derive(&listed), RelationState::Unassigned);
        assert_eq!(repo.calls(RepoOp::HasActive), 2);
    }

    #[tokio::test]
    async fn test_unique_constraint_rejects_second_active() {
        let repo = InMemoryRelationRepository::new().with_unique_active_constraint();
        let device = fixtures::computer("SN-2");
        let first = fixtures::user("A", "a@example.com");
        let second = fixtures::user("B", "b@example.com");

        repo.create(&request_for(&first, &device)).await.unwrap();
        let result = repo.create(&request_for(&second, &device)).await;
        assertions::assert_conflict(&result);
        assert_eq!(repo.active_for(device.id).len(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_is_one_shot() {
        let repo = InMemoryRelationRepository::new();
        repo.fail_next(RepoOp::HasActive, DeskError::not_found("device", "d1"));
        let device = DeviceId::generate();
        assertions::assert_not_found(&repo.has_active_relation(device).await, "device");
        assert!(!repo.has_active_relation(device).await.unwrap());
    }

    #[tokio::test]
    async fn test_end_unknown_relation_is_not_found() {
        let repo = InMemoryRelationRepository::new();
        assertions::assert_not_found(&repo.end(RelationId::generate()).await, "relation");
    }

    #[tokio::test]
    async fn test_list_source_records_and_defaults() {
        let source = RecordingListSource::new();
        let params = vec![("page".to_string(), "1".to_string())];
        let body = source.fetch_list("tickets", &params).await.unwrap();
        assert_eq!(body["data"]["tickets"], json!([]));
        assert_eq!(source.last_call().unwrap().param("page"), Some("1"));
    }

    proptest! {
        #[test]
        fn prop_generated_filters_pass_the_table(filters in generators::arb_filters(EntityKind::Ticket)) {
            let mut set = FilterSet::new(EntityKind::Ticket);
            for filter in &filters {
                prop_assert!(set.set(&filter.key, FilterValue::from_wire(&filter.value)).is_ok());
            }
        }
    }
}
