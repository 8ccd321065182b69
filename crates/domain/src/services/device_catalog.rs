//! Device catalog: posting, owner edits and admin moderation.

use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use shared::pagination::{PageRequest, Paginated};

use crate::error::{DomainError, DomainResult};
use crate::models::{
    Actor, AdminDevicesQuery, ApprovedDevicesQuery, CreateDeviceRequest, Device, DeviceFilter,
    ModerationDecision, ModerationStatus, SetDeviceStatusRequest, UpdateDeviceRequest,
};
use crate::services::notification::{Audience, NotificationDispatcher, NotificationEvent};
use crate::stores::DeviceStore;

pub(crate) fn ensure_admin(actor: &Actor) -> DomainResult<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(DomainError::Forbidden("Admin access required".to_string()))
    }
}

const MAX_EDIT_ATTEMPTS: u32 = 3;

fn device_not_found() -> DomainError {
    DomainError::NotFound("Device not found".to_string())
}

/// Owns devices and their moderation state.
#[derive(Clone)]
pub struct DeviceCatalog {
    devices: Arc<dyn DeviceStore>,
    notifications: NotificationDispatcher,
}

impl DeviceCatalog {
    pub fn new(devices: Arc<dyn DeviceStore>, notifications: NotificationDispatcher) -> Self {
        Self {
            devices,
            notifications,
        }
    }

    /// Posts a device. It always starts pending and active.
    pub async fn create_device(
        &self,
        actor: &Actor,
        request: CreateDeviceRequest,
    ) -> DomainResult<Device> {
        request.validate()?;

        let device = self
            .devices
            .insert_device(request.into_new_device(actor.user_id))
            .await?;

        info!(
            device_id = %device.id,
            owner_id = %device.owner_id,
            device_type = %device.device_type,
            "Device created"
        );
        Ok(device)
    }

    /// Approved devices are public; anything else only to its owner or an admin.
    pub async fn get_device(&self, viewer: Option<&Actor>, device_id: Uuid) -> DomainResult<Device> {
        let device = self
            .devices
            .find_device(device_id)
            .await?
            .ok_or_else(device_not_found)?;

        let visible = device.status == ModerationStatus::Approved
            || viewer.map_or(false, |v| v.is_admin() || device.is_owned_by(v.user_id));
        if !visible {
            return Err(device_not_found());
        }
        Ok(device)
    }

    pub async fn list_approved(
        &self,
        query: &ApprovedDevicesQuery,
    ) -> DomainResult<Paginated<Device>> {
        let page = PageRequest::new(query.page, query.limit);
        let (devices, total) = self.devices.list_devices(&query.filter(), page).await?;
        Ok(Paginated::new(devices, page, total))
    }

    /// Every device the actor posted, whatever its status.
    pub async fn list_mine(
        &self,
        actor: &Actor,
        page: PageRequest,
    ) -> DomainResult<Paginated<Device>> {
        let filter = DeviceFilter {
            owner_id: Some(actor.user_id),
            ..DeviceFilter::default()
        };
        let (devices, total) = self.devices.list_devices(&filter, page).await?;
        Ok(Paginated::new(devices, page, total))
    }

    pub async fn list_all_for_admin(
        &self,
        actor: &Actor,
        query: &AdminDevicesQuery,
    ) -> DomainResult<Paginated<Device>> {
        ensure_admin(actor)?;

        let page = PageRequest::new(query.page, query.limit);
        let (devices, total) = self.devices.list_devices(&query.filter(), page).await?;
        Ok(Paginated::new(devices, page, total))
    }

    /// Applies an owner edit. An approved device goes back to pending.
    pub async fn update_owned(
        &self,
        actor: &Actor,
        device_id: Uuid,
        update: UpdateDeviceRequest,
    ) -> DomainResult<Device> {
        update.validate()?;

        // Re-applied on a fresh read if another write got in first.
        let mut attempts = 0;
        let (device, previous_status) = loop {
            attempts += 1;
            let mut device = self.load_owned(actor, device_id).await?;
            let read_at = device.updated_at;
            let previous_status = device.status;
            let now = device.next_revision_time();
            device.apply_update(update.clone(), now);

            if let Some(saved) = self.devices.update_device(&device, read_at).await? {
                break (saved, previous_status);
            }
            if attempts >= MAX_EDIT_ATTEMPTS {
                return Err(DomainError::Conflict(
                    "Device is being modified concurrently; try again".to_string(),
                ));
            }
        };

        info!(
            device_id = %device.id,
            owner_id = %device.owner_id,
            previous_status = %previous_status,
            status = %device.status,
            "Device updated"
        );
        Ok(device)
    }

    pub async fn delete_owned(&self, actor: &Actor, device_id: Uuid) -> DomainResult<()> {
        self.load_owned(actor, device_id).await?;
        self.delete(actor, device_id).await
    }

    pub async fn delete_as_admin(&self, actor: &Actor, device_id: Uuid) -> DomainResult<()> {
        ensure_admin(actor)?;
        self.delete(actor, device_id).await
    }

    /// Records an admin decision and tells the owner about it.
    pub async fn set_moderation_status(
        &self,
        actor: &Actor,
        device_id: Uuid,
        request: SetDeviceStatusRequest,
    ) -> DomainResult<Device> {
        ensure_admin(actor)?;
        request.validate()?;

        let decision = ModerationDecision::parse(&request.status).ok_or_else(|| {
            DomainError::InvalidStatus(format!(
                "'{}' is not a valid moderation status; expected 'approved' or 'rejected'",
                request.status
            ))
        })?;

        let mut device = self
            .devices
            .find_device(device_id)
            .await?
            .ok_or_else(device_not_found)?;

        let read_at = device.updated_at;
        let now = device.next_revision_time();
        device.moderate(
            decision,
            actor.user_id,
            request.notes,
            request.rejection_reason,
            now,
        );

        // Fails if the device changed after it was read.
        let device = match self.devices.update_device(&device, read_at).await? {
            Some(device) => device,
            None => {
                self.devices
                    .find_device(device_id)
                    .await?
                    .ok_or_else(device_not_found)?;
                return Err(DomainError::Conflict(
                    "Device was modified while being moderated; reload and review again"
                        .to_string(),
                ));
            }
        };

        info!(
            device_id = %device.id,
            admin_id = %actor.user_id,
            status = %device.status,
            "Device moderated"
        );

        self.notifications.dispatch(
            vec![Audience::User(device.owner_id)],
            NotificationEvent::DeviceModerated {
                device_id: device.id,
                device_title: device.title.clone(),
                status: device.status,
                reason: device.rejection_reason.clone(),
            },
        );

        Ok(device)
    }

    async fn load_owned(&self, actor: &Actor, device_id: Uuid) -> DomainResult<Device> {
        let device = self
            .devices
            .find_device(device_id)
            .await?
            .ok_or_else(device_not_found)?;

        if !device.is_owned_by(actor.user_id) {
            return Err(DomainError::Forbidden(
                "Only the device owner can modify this device".to_string(),
            ));
        }
        Ok(device)
    }

    async fn delete(&self, actor: &Actor, device_id: Uuid) -> DomainResult<()> {
        if !self.devices.delete_device(device_id).await? {
            return Err(device_not_found());
        }

        info!(device_id = %device_id, deleted_by = %actor.user_id, "Device deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Contact, DeviceCondition, DeviceLocation, DeviceType, Role};
    use crate::services::notification::MockNotifier;
    use crate::stores::memory::InMemoryStore;
    use std::time::Duration;

    struct Fixture {
        store: Arc<InMemoryStore>,
        notifier: MockNotifier,
        catalog: DeviceCatalog,
        donor: Actor,
        admin: Actor,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let notifier = MockNotifier::new();
            let dispatcher = NotificationDispatcher::new(Arc::new(notifier.clone()), store.clone());
            let catalog = DeviceCatalog::new(store.clone(), dispatcher);

            let donor = Actor::new(Uuid::new_v4(), Role::Donor);
            let admin = Actor::new(Uuid::new_v4(), Role::Admin);
            for (actor, name) in [(&donor, "donor"), (&admin, "admin")] {
                store
                    .add_user(
                        Contact {
                            user_id: actor.user_id,
                            name: name.to_string(),
                            email: format!("{}@example.com", name),
                        },
                        actor.role,
                    )
                    .unwrap();
            }

            Self {
                store,
                notifier,
                catalog,
                donor,
                admin,
            }
        }

        async fn post(&self, title: &str) -> Device {
            self.catalog
                .create_device(&self.donor, create_request(title))
                .await
                .unwrap()
        }

        async fn post_approved(&self, title: &str) -> Device {
            let device = self.post(title).await;
            self.catalog
                .set_moderation_status(&self.admin, device.id, status_request("approved"))
                .await
                .unwrap()
        }
    }

    fn create_request(title: &str) -> CreateDeviceRequest {
        CreateDeviceRequest {
            title: title.to_string(),
            description: "Lightly used, charger included".to_string(),
            device_type: DeviceType::Laptop,
            condition: DeviceCondition::Good,
            location: Some(DeviceLocation {
                city: Some("Austin".to_string()),
                state: Some("TX".to_string()),
                country: Some("USA".to_string()),
            }),
            contact_info: None,
            photos: vec![],
        }
    }

    fn status_request(status: &str) -> SetDeviceStatusRequest {
        SetDeviceStatusRequest {
            status: status.to_string(),
            notes: None,
            rejection_reason: None,
        }
    }

    #[tokio::test]
    async fn test_create_device_is_pending() {
        let fx = Fixture::new();
        let device = fx.post("MacBook Air 2017").await;

        assert_eq!(device.status, ModerationStatus::Pending);
        assert_eq!(device.owner_id, fx.donor.user_id);
        assert!(device.is_active);
    }

    #[tokio::test]
    async fn test_create_device_validation() {
        let fx = Fixture::new();
        let mut request = create_request("x");
        request.title = "   ".to_string();

        let err = fx.catalog.create_device(&fx.donor, request).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));

        let mut request = create_request("Camera");
        request.photos = (0..11).map(|i| format!("blob/{}.jpg", i)).collect();
        let err = fx.catalog.create_device(&fx.donor, request).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_moderation_approve_and_notify_owner() {
        let fx = Fixture::new();
        let device = fx.post("Dell XPS").await;

        let approved = fx
            .catalog
            .set_moderation_status(
                &fx.admin,
                device.id,
                SetDeviceStatusRequest {
                    status: "approved".to_string(),
                    notes: Some("Looks good".to_string()),
                    rejection_reason: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(approved.status, ModerationStatus::Approved);
        assert_eq!(approved.approved_by, Some(fx.admin.user_id));
        assert!(approved.approved_at.is_some());
        assert_eq!(approved.admin_notes.as_deref(), Some("Looks good"));

        for _ in 0..50 {
            if !fx.notifier.sent().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let sent = fx.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0.user_id, fx.donor.user_id);
        assert!(matches!(
            sent[0].1,
            NotificationEvent::DeviceModerated {
                status: ModerationStatus::Approved,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_moderation_reject_clears_approval() {
        let fx = Fixture::new();
        let device = fx.post_approved("Galaxy Tab").await;

        let rejected = fx
            .catalog
            .set_moderation_status(
                &fx.admin,
                device.id,
                SetDeviceStatusRequest {
                    status: "rejected".to_string(),
                    notes: None,
                    rejection_reason: Some("Photos missing".to_string()),
                },
            )
            .await
            .unwrap();

        assert_eq!(rejected.status, ModerationStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("Photos missing"));
        assert!(rejected.approved_by.is_none());
        assert!(rejected.approved_at.is_none());
    }

    #[tokio::test]
    async fn test_moderation_invalid_status() {
        let fx = Fixture::new();
        let device = fx.post("Kindle").await;

        for status in ["pending", "suspended", "bogus", ""] {
            let err = fx
                .catalog
                .set_moderation_status(&fx.admin, device.id, status_request(status))
                .await
                .unwrap_err();
            assert!(matches!(err, DomainError::InvalidStatus(_)), "{}", status);
        }
    }

    #[tokio::test]
    async fn test_moderation_requires_admin_and_existing_device() {
        let fx = Fixture::new();
        let device = fx.post("Kindle").await;

        let err = fx
            .catalog
            .set_moderation_status(&fx.donor, device.id, status_request("approved"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let err = fx
            .catalog
            .set_moderation_status(&fx.admin, Uuid::new_v4(), status_request("approved"))
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_edit_resets_approved_device() {
        let fx = Fixture::new();
        let device = fx.post_approved("iPhone 8").await;
        assert_eq!(device.status, ModerationStatus::Approved);

        let updated = fx
            .catalog
            .update_owned(
                &fx.donor,
                device.id,
                UpdateDeviceRequest {
                    condition: Some(DeviceCondition::Fair),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, ModerationStatus::Pending);
        assert!(updated.approved_by.is_none());
        assert!(updated.approved_at.is_none());
        assert_eq!(updated.condition, DeviceCondition::Fair);
    }

    #[tokio::test]
    async fn test_update_owned_errors() {
        let fx = Fixture::new();
        let device = fx.post("Surface Go").await;
        let stranger = Actor::new(Uuid::new_v4(), Role::Donor);

        let err = fx
            .catalog
            .update_owned(&stranger, device.id, UpdateDeviceRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let err = fx
            .catalog
            .update_owned(&fx.donor, Uuid::new_v4(), UpdateDeviceRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));

        let stored = fx.store.find_device(device.id).await.unwrap().unwrap();
        assert_eq!(stored, device);
    }

    #[tokio::test]
    async fn test_delete_owned_and_admin() {
        let fx = Fixture::new();
        let first = fx.post("Monitor").await;
        let second = fx.post("Keyboard").await;
        let stranger = Actor::new(Uuid::new_v4(), Role::Requester);

        let err = fx.catalog.delete_owned(&stranger, first.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        fx.catalog.delete_owned(&fx.donor, first.id).await.unwrap();
        assert!(fx.store.find_device(first.id).await.unwrap().is_none());

        let err = fx.catalog.delete_as_admin(&fx.donor, second.id).await.unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        fx.catalog.delete_as_admin(&fx.admin, second.id).await.unwrap();
        let err = fx.catalog.delete_as_admin(&fx.admin, second.id).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_get_device_visibility() {
        let fx = Fixture::new();
        let pending = fx.post("Pending phone").await;
        let approved = fx.post_approved("Approved phone").await;
        let stranger = Actor::new(Uuid::new_v4(), Role::Requester);

        assert!(fx.catalog.get_device(None, approved.id).await.is_ok());
        assert!(fx.catalog.get_device(Some(&stranger), approved.id).await.is_ok());

        let err = fx.catalog.get_device(None, pending.id).await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
        let err = fx
            .catalog
            .get_device(Some(&stranger), pending.id)
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));

        assert!(fx.catalog.get_device(Some(&fx.donor), pending.id).await.is_ok());
        assert!(fx.catalog.get_device(Some(&fx.admin), pending.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_list_approved_filters() {
        let fx = Fixture::new();
        fx.post("Still pending").await;
        let approved = fx.post_approved("Approved laptop").await;
        let inactive = fx.post_approved("Inactive laptop").await;
        let mut inactive = fx.store.find_device(inactive.id).await.unwrap().unwrap();
        inactive.is_active = false;
        fx.store.put_device(inactive.clone()).unwrap();

        let page = fx
            .catalog
            .list_approved(&ApprovedDevicesQuery::default())
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 1);
        assert_eq!(page.data[0].id, approved.id);

        let page = fx
            .catalog
            .list_approved(&ApprovedDevicesQuery {
                is_active: Some(false),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.data[0].id, inactive.id);

        let page = fx
            .catalog
            .list_approved(&ApprovedDevicesQuery {
                location: Some("aus".to_string()),
                device_type: Some(DeviceType::Laptop),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(page.pagination.total, 1);

        let page = fx
            .catalog
            .list_approved(&ApprovedDevicesQuery {
                location: Some("Berlin".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(page.data.is_empty());
    }

    #[tokio::test]
    async fn test_list_approved_newest_first() {
        let fx = Fixture::new();
        let older = fx.post_approved("Older").await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        let newer = fx.post_approved("Newer").await;

        let page = fx
            .catalog
            .list_approved(&ApprovedDevicesQuery::default())
            .await
            .unwrap();
        let ids: Vec<Uuid> = page.data.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![newer.id, older.id]);
    }

    #[tokio::test]
    async fn test_list_mine_and_admin_queue() {
        let fx = Fixture::new();
        fx.post("One").await;
        fx.post_approved("Two").await;

        let mine = fx
            .catalog
            .list_mine(&fx.donor, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(mine.pagination.total, 2);

        let err = fx
            .catalog
            .list_all_for_admin(&fx.donor, &AdminDevicesQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));

        let queue = fx
            .catalog
            .list_all_for_admin(
                &fx.admin,
                &AdminDevicesQuery {
                    status: Some(ModerationStatus::Pending),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(queue.pagination.total, 1);
        assert_eq!(queue.data[0].title, "One");
    }

    /// Holds the first `find_device` result until released, so a second
    /// writer can get in between the read and the write.
    struct PausingStore {
        inner: Arc<InMemoryStore>,
        reached: std::sync::Mutex<Option<tokio::sync::oneshot::Sender<()>>>,
        release: std::sync::Mutex<Option<tokio::sync::oneshot::Receiver<()>>>,
    }

    impl PausingStore {
        fn new(
            inner: Arc<InMemoryStore>,
        ) -> (
            Self,
            tokio::sync::oneshot::Receiver<()>,
            tokio::sync::oneshot::Sender<()>,
        ) {
            let (reached_tx, reached_rx) = tokio::sync::oneshot::channel();
            let (release_tx, release_rx) = tokio::sync::oneshot::channel();
            let store = Self {
                inner,
                reached: std::sync::Mutex::new(Some(reached_tx)),
                release: std::sync::Mutex::new(Some(release_rx)),
            };
            (store, reached_rx, release_tx)
        }
    }

    #[async_trait::async_trait]
    impl DeviceStore for PausingStore {
        async fn insert_device(&self, device: crate::models::NewDevice) -> DomainResult<Device> {
            self.inner.insert_device(device).await
        }

        async fn find_device(&self, id: Uuid) -> DomainResult<Option<Device>> {
            let found = self.inner.find_device(id).await?;
            let release = self.release.lock().unwrap().take();
            if let Some(release) = release {
                if let Some(reached) = self.reached.lock().unwrap().take() {
                    let _ = reached.send(());
                }
                let _ = release.await;
            }
            Ok(found)
        }

        async fn list_devices(
            &self,
            filter: &DeviceFilter,
            page: PageRequest,
        ) -> DomainResult<(Vec<Device>, i64)> {
            self.inner.list_devices(filter, page).await
        }

        async fn update_device(
            &self,
            device: &Device,
            expected_updated_at: chrono::DateTime<chrono::Utc>,
        ) -> DomainResult<Option<Device>> {
            self.inner.update_device(device, expected_updated_at).await
        }

        async fn delete_device(&self, id: Uuid) -> DomainResult<bool> {
            self.inner.delete_device(id).await
        }
    }

    impl Fixture {
        fn paused_catalog(
            &self,
        ) -> (
            DeviceCatalog,
            tokio::sync::oneshot::Receiver<()>,
            tokio::sync::oneshot::Sender<()>,
        ) {
            let (store, reached, release) = PausingStore::new(self.store.clone());
            let dispatcher =
                NotificationDispatcher::new(Arc::new(self.notifier.clone()), self.store.clone());
            (DeviceCatalog::new(Arc::new(store), dispatcher), reached, release)
        }
    }

    #[tokio::test]
    async fn test_stale_moderation_does_not_overwrite_edit() {
        let fx = Fixture::new();
        let device_id = fx.post("Old title").await.id;
        let (admin_catalog, reached, release) = fx.paused_catalog();

        let admin = fx.admin;
        let moderation = tokio::spawn(async move {
            admin_catalog
                .set_moderation_status(&admin, device_id, status_request("approved"))
                .await
        });
        reached.await.unwrap();

        let edited = fx
            .catalog
            .update_owned(
                &fx.donor,
                device_id,
                UpdateDeviceRequest {
                    title: Some("New title".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(edited.title, "New title");

        release.send(()).unwrap();
        let err = moderation.await.unwrap().unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));

        let stored = fx.store.find_device(device_id).await.unwrap().unwrap();
        assert_eq!(stored.title, "New title");
        assert_eq!(stored.status, ModerationStatus::Pending);
        assert!(stored.approved_by.is_none());
    }

    #[tokio::test]
    async fn test_edit_racing_approval_still_resets_to_pending() {
        let fx = Fixture::new();
        let device_id = fx.post("Old title").await.id;
        let (owner_catalog, reached, release) = fx.paused_catalog();

        let donor = fx.donor;
        let edit = tokio::spawn(async move {
            owner_catalog
                .update_owned(
                    &donor,
                    device_id,
                    UpdateDeviceRequest {
                        title: Some("New title".to_string()),
                        ..Default::default()
                    },
                )
                .await
        });
        reached.await.unwrap();

        let approved = fx
            .catalog
            .set_moderation_status(&fx.admin, device_id, status_request("approved"))
            .await
            .unwrap();
        assert_eq!(approved.status, ModerationStatus::Approved);

        release.send(()).unwrap();
        let edited = edit.await.unwrap().unwrap();
        assert_eq!(edited.title, "New title");
        assert_eq!(edited.status, ModerationStatus::Pending);

        let stored = fx.store.find_device(device_id).await.unwrap().unwrap();
        assert_eq!(stored, edited);
    }
}
