//! In-memory implementation of every store trait.
//!
//! Each operation takes a single lock, so uniqueness and conditional
//! updates are as atomic as their Postgres counterparts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use shared::pagination::PageRequest;

use super::{DeviceRequestStore, DeviceStore, UserDirectory};
use crate::error::{DomainError, DomainResult};
use crate::models::{
    Contact, Device, DeviceFilter, DeviceRequest, DeviceRequestFilter, ModerationStatus,
    NewDevice, NewDeviceRequest, RequestStatus, Role, StatusUpdate,
};

#[derive(Default)]
struct State {
    devices: HashMap<Uuid, Device>,
    requests: HashMap<Uuid, DeviceRequest>,
    users: HashMap<Uuid, (Contact, Role)>,
}

/// Thread-safe store backed by hash maps.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user so notifications can find them.
    pub fn add_user(&self, contact: Contact, role: Role) -> DomainResult<()> {
        self.lock()?
            .users
            .insert(contact.user_id, (contact, role));
        Ok(())
    }

    /// Stores a device as-is, bypassing the pending-on-insert rule.
    pub fn put_device(&self, device: Device) -> DomainResult<()> {
        self.lock()?.devices.insert(device.id, device);
        Ok(())
    }

    fn lock(&self) -> DomainResult<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| DomainError::Storage("in-memory store lock poisoned".to_string()))
    }
}

fn paginate<T: Clone>(mut items: Vec<T>, page: PageRequest) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let offset = page.offset() as usize;
    let items = if offset >= items.len() {
        Vec::new()
    } else {
        items.drain(offset..).take(page.limit as usize).collect()
    };
    (items, total)
}

#[async_trait]
impl DeviceStore for InMemoryStore {
    async fn insert_device(&self, device: NewDevice) -> DomainResult<Device> {
        let now = Utc::now();
        let device = Device {
            id: Uuid::new_v4(),
            owner_id: device.owner_id,
            title: device.title,
            description: device.description,
            device_type: device.device_type,
            condition: device.condition,
            location: device.location,
            contact_info: device.contact_info,
            photos: device.photos,
            status: ModerationStatus::Pending,
            is_active: true,
            admin_notes: None,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        };
        self.lock()?.devices.insert(device.id, device.clone());
        Ok(device)
    }

    async fn find_device(&self, id: Uuid) -> DomainResult<Option<Device>> {
        Ok(self.lock()?.devices.get(&id).cloned())
    }

    async fn list_devices(
        &self,
        filter: &DeviceFilter,
        page: PageRequest,
    ) -> DomainResult<(Vec<Device>, i64)> {
        let mut devices: Vec<Device> = self
            .lock()?
            .devices
            .values()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect();
        devices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(devices, page))
    }

    async fn update_device(
        &self,
        device: &Device,
        expected_updated_at: DateTime<Utc>,
    ) -> DomainResult<Option<Device>> {
        let mut state = self.lock()?;
        match state.devices.get_mut(&device.id) {
            Some(stored) if stored.updated_at == expected_updated_at => {
                *stored = device.clone();
                Ok(Some(device.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_device(&self, id: Uuid) -> DomainResult<bool> {
        let mut state = self.lock()?;
        if state.devices.remove(&id).is_none() {
            return Ok(false);
        }
        state.requests.retain(|_, r| r.device_id != id);
        Ok(true)
    }
}

#[async_trait]
impl DeviceRequestStore for InMemoryStore {
    async fn insert_request(&self, request: NewDeviceRequest) -> DomainResult<DeviceRequest> {
        let mut state = self.lock()?;

        let existing = state.requests.values().find(|r| {
            r.requester_id == request.requester_id
                && r.device_id == request.device_id
                && r.status.is_active()
        });
        if let Some(existing) = existing {
            return Err(DomainError::DuplicateRequest(Some(existing.into())));
        }
        if !state.devices.contains_key(&request.device_id) {
            return Err(DomainError::NotFound("Device not found".to_string()));
        }

        let now = Utc::now();
        let request = DeviceRequest {
            id: Uuid::new_v4(),
            device_id: request.device_id,
            requester_id: request.requester_id,
            message: request.message,
            status: RequestStatus::Pending,
            approved_by: None,
            approved_at: None,
            rejection_reason: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        state.requests.insert(request.id, request.clone());
        Ok(request)
    }

    async fn find_request(&self, id: Uuid) -> DomainResult<Option<DeviceRequest>> {
        Ok(self.lock()?.requests.get(&id).cloned())
    }

    async fn find_active_request(
        &self,
        requester_id: Uuid,
        device_id: Uuid,
    ) -> DomainResult<Option<DeviceRequest>> {
        Ok(self
            .lock()?
            .requests
            .values()
            .find(|r| {
                r.requester_id == requester_id && r.device_id == device_id && r.status.is_active()
            })
            .cloned())
    }

    async fn count_active_for_requester(&self, requester_id: Uuid) -> DomainResult<i64> {
        Ok(self
            .lock()?
            .requests
            .values()
            .filter(|r| r.requester_id == requester_id && r.status.is_active())
            .count() as i64)
    }

    async fn update_request_status(
        &self,
        id: Uuid,
        expected: RequestStatus,
        update: &StatusUpdate,
    ) -> DomainResult<Option<DeviceRequest>> {
        let mut state = self.lock()?;
        match state.requests.get_mut(&id) {
            Some(request) if request.status == expected => {
                update.apply(request);
                Ok(Some(request.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_request(
        &self,
        id: Uuid,
        only_if: Option<RequestStatus>,
    ) -> DomainResult<bool> {
        let mut state = self.lock()?;
        match state.requests.get(&id) {
            Some(request) if only_if.map_or(true, |status| request.status == status) => {
                state.requests.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_requests(
        &self,
        filter: &DeviceRequestFilter,
        page: PageRequest,
    ) -> DomainResult<(Vec<DeviceRequest>, i64)> {
        let mut requests: Vec<DeviceRequest> = self
            .lock()?
            .requests
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(requests, page))
    }
}

#[async_trait]
impl UserDirectory for InMemoryStore {
    async fn find_contact(&self, user_id: Uuid) -> DomainResult<Option<Contact>> {
        Ok(self.lock()?.users.get(&user_id).map(|(c, _)| c.clone()))
    }

    async fn list_admin_contacts(&self) -> DomainResult<Vec<Contact>> {
        let mut admins: Vec<Contact> = self
            .lock()?
            .users
            .values()
            .filter(|(_, role)| *role == Role::Admin)
            .map(|(c, _)| c.clone())
            .collect();
        admins.sort_by(|a, b| a.email.cmp(&b.email));
        Ok(admins)
    }
}
