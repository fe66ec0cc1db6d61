//! Device and user records.

use crate::cache::{CachedView, Freshness, ViewCache};
use crate::error::log_failure;
use crate::policy::RequestPolicy;
use assetdesk_core::{
    DeskResult, Device, DeviceId, DeviceInsert, DeviceType, DeviceUpdate, EntityIdType, EntityKind,
    EntityRow, Mutation, User, UserId, UserInsert, UserUpdate, ViewKey,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Remote device and user operations.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_device(&self, id: DeviceId) -> DeskResult<Device>;

    async fn create_device(&self, insert: &DeviceInsert) -> DeskResult<Device>;

    async fn update_device(&self, id: DeviceId, update: &DeviceUpdate) -> DeskResult<Device>;

    async fn delete_device(&self, id: DeviceId) -> DeskResult<()>;

    async fn get_user(&self, id: UserId) -> DeskResult<User>;

    async fn create_user(&self, insert: &UserInsert) -> DeskResult<User>;

    async fn update_user(&self, id: UserId, update: &UserUpdate) -> DeskResult<User>;

    async fn delete_user(&self, id: UserId) -> DeskResult<()>;
}

pub struct Inventory<S> {
    store: Arc<S>,
    cache: Arc<ViewCache>,
    policy: RequestPolicy,
}

impl<S: InventoryStore> Inventory<S> {
    pub fn new(store: Arc<S>, cache: Arc<ViewCache>, policy: RequestPolicy) -> Self {
        Self {
            store,
            cache,
            policy,
        }
    }

    /// Read-through fetch of one device, cached under the detail view of its
    /// own type.
    pub async fn device(&self, id: DeviceId, freshness: Freshness) -> DeskResult<Device> {
        let kinds = [EntityKind::Computer, EntityKind::Monitor];
        for kind in kinds {
            let key = ViewKey::Detail(kind, id.as_uuid());
            if let Some(EntityRow::Device(device)) = self.cached(key, freshness) {
                return Ok(device);
            }
        }

        // The type is only known once the row arrives.
        let marks = kinds.map(|kind| self.cache.watermark(ViewKey::Detail(kind, id.as_uuid())));
        let device = self
            .policy
            .run("devices", self.store.get_device(id))
            .await
            .inspect_err(|err| log_failure("get device", err))?;
        let key = ViewKey::Detail(EntityKind::for_device_type(device.device_type), id.as_uuid());
        if let Some(since) = marks.into_iter().find(|mark| mark.key() == key) {
            self.cache
                .store(since, None, CachedView::Entity(EntityRow::Device(device.clone())));
        }
        Ok(device)
    }

    pub async fn create_device(&self, insert: &DeviceInsert) -> DeskResult<Device> {
        insert
            .validate()
            .inspect_err(|err| log_failure("create device", err))?;
        let device = self
            .policy
            .run("devices", self.store.create_device(insert))
            .await
            .inspect_err(|err| log_failure("create device", err))?;
        self.cache.apply(&Mutation::CreateDevice(device.device_type));
        tracing::info!(device_id = %device.id, serial = %device.serial_number, "Device created");
        Ok(device)
    }

    /// Serial number and type never change; only the fields `DeviceUpdate`
    /// carries are sent. The views invalidated follow the type of the row the
    /// server returns.
    pub async fn update_device(&self, id: DeviceId, update: &DeviceUpdate) -> DeskResult<Device> {
        update
            .validate()
            .inspect_err(|err| log_failure("update device", err))?;
        let device = self
            .policy
            .run("devices", self.store.update_device(id, update))
            .await
            .inspect_err(|err| log_failure("update device", err))?;
        self.cache
            .apply(&Mutation::UpdateDevice(device.device_type, device.id));
        tracing::info!(device_id = %id, "Device updated");
        Ok(device)
    }

    pub async fn delete_device(&self, device_type: DeviceType, id: DeviceId) -> DeskResult<()> {
        self.policy
            .run("devices", self.store.delete_device(id))
            .await
            .inspect_err(|err| log_failure("delete device", err))?;
        self.cache.apply(&Mutation::DeleteDevice(device_type, id));
        tracing::info!(device_id = %id, "Device deleted");
        Ok(())
    }

    pub async fn user(&self, id: UserId, freshness: Freshness) -> DeskResult<User> {
        let key = ViewKey::Detail(EntityKind::User, id.as_uuid());
        if let Some(EntityRow::User(user)) = self.cached(key, freshness) {
            return Ok(user);
        }
        let since = self.cache.watermark(key);
        let user = self
            .policy
            .run("users", self.store.get_user(id))
            .await
            .inspect_err(|err| log_failure("get user", err))?;
        self.cache
            .store(since, None, CachedView::Entity(EntityRow::User(user.clone())));
        Ok(user)
    }

    pub async fn create_user(&self, insert: &UserInsert) -> DeskResult<User> {
        insert
            .validate()
            .inspect_err(|err| log_failure("create user", err))?;
        let user = self
            .policy
            .run("users", self.store.create_user(insert))
            .await
            .inspect_err(|err| log_failure("create user", err))?;
        self.cache.apply(&Mutation::CreateUser);
        tracing::info!(user_id = %user.id, "User created");
        Ok(user)
    }

    pub async fn update_user(&self, id: UserId, update: &UserUpdate) -> DeskResult<User> {
        update
            .validate()
            .inspect_err(|err| log_failure("update user", err))?;
        let user = self
            .policy
            .run("users", self.store.update_user(id, update))
            .await
            .inspect_err(|err| log_failure("update user", err))?;
        self.cache.apply(&Mutation::UpdateUser(id));
        tracing::info!(user_id = %id, "User updated");
        Ok(user)
    }

    pub async fn delete_user(&self, id: UserId) -> DeskResult<()> {
        self.policy
            .run("users", self.store.delete_user(id))
            .await
            .inspect_err(|err| log_failure("delete user", err))?;
        self.cache.apply(&Mutation::DeleteUser(id));
        tracing::info!(user_id = %id, "User deleted");
        Ok(())
    }

    fn cached(&self, key: ViewKey, freshness: Freshness) -> Option<EntityRow> {
        match self.cache.get(key, None, freshness)?.into_value() {
            CachedView::Entity(row) => Some(row),
            _ => None,
        }
    }
}
