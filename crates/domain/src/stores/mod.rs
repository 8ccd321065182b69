//! Storage seams used by the domain services.
//!
//! The Postgres repositories in the `persistence` crate implement these for
//! production; [`memory::InMemoryStore`] implements them for tests.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use shared::pagination::PageRequest;

use crate::error::DomainResult;
use crate::models::{
    Contact, Device, DeviceFilter, DeviceRequest, DeviceRequestFilter, NewDevice,
    NewDeviceRequest, RequestStatus, StatusUpdate,
};

#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn insert_device(&self, device: NewDevice) -> DomainResult<Device>;

    async fn find_device(&self, id: Uuid) -> DomainResult<Option<Device>>;

    /// Newest first, with the total number of matches.
    async fn list_devices(
        &self,
        filter: &DeviceFilter,
        page: PageRequest,
    ) -> DomainResult<(Vec<Device>, i64)>;

    /// Persists every mutable field of the device, but only if the stored row
    /// still carries `expected_updated_at`.
    ///
    /// Returns `None` when the guard failed or the device is gone.
    async fn update_device(
        &self,
        device: &Device,
        expected_updated_at: DateTime<Utc>,
    ) -> DomainResult<Option<Device>>;

    /// Deletes the device and all of its requests. Returns false if it did not exist.
    async fn delete_device(&self, id: Uuid) -> DomainResult<bool>;
}

#[async_trait]
pub trait DeviceRequestStore: Send + Sync {
    /// Inserts a pending request.
    ///
    /// Must fail with `DomainError::DuplicateRequest` when the requester
    /// already holds an active request for the device, atomically with the insert.
    async fn insert_request(&self, request: NewDeviceRequest) -> DomainResult<DeviceRequest>;

    async fn find_request(&self, id: Uuid) -> DomainResult<Option<DeviceRequest>>;

    /// The requester's pending or approved request for the device, if any.
    async fn find_active_request(
        &self,
        requester_id: Uuid,
        device_id: Uuid,
    ) -> DomainResult<Option<DeviceRequest>>;

    async fn count_active_for_requester(&self, requester_id: Uuid) -> DomainResult<i64>;

    /// Applies `update` only if the request is still in `expected`.
    ///
    /// Returns `None` when the guard failed or the request is gone.
    async fn update_request_status(
        &self,
        id: Uuid,
        expected: RequestStatus,
        update: &StatusUpdate,
    ) -> DomainResult<Option<DeviceRequest>>;

    /// Deletes the request, restricted to `only_if` status when given.
    ///
    /// Returns false when the guard failed or the request is gone.
    async fn delete_request(&self, id: Uuid, only_if: Option<RequestStatus>)
        -> DomainResult<bool>;

    /// Newest first, with the total number of matches.
    async fn list_requests(
        &self,
        filter: &DeviceRequestFilter,
        page: PageRequest,
    ) -> DomainResult<(Vec<DeviceRequest>, i64)>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_contact(&self, user_id: Uuid) -> DomainResult<Option<Contact>>;

    async fn list_admin_contacts(&self) -> DomainResult<Vec<Contact>>;
}
