//! Device request engine.
//!
//! Eligibility checks before creation, authorization and the transition
//! table on status changes, and notifications as a side effect.

use chrono::Utc;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use shared::pagination::{PageRequest, Paginated};

use crate::error::{DomainError, DomainResult};
use crate::models::{
    Actor, AdminDeviceRequestsQuery, CreateDeviceRequestPayload, CreatedDeviceRequest, Device,
    DeviceRequest, DeviceRequestFilter, Eligibility, NewDeviceRequest, RequestPolicy,
    RequestStatus, Role, SetRequestStatusPayload, StatusUpdate,
};
use crate::services::device_catalog::ensure_admin;
use crate::services::notification::{Audience, NotificationDispatcher, NotificationEvent};
use crate::stores::{DeviceRequestStore, DeviceStore};

fn request_not_found() -> DomainError {
    DomainError::NotFound("Device request not found".to_string())
}

fn cancel_not_pending(status: RequestStatus) -> DomainError {
    DomainError::InvalidTransition(format!(
        "Only pending requests can be cancelled; this request is {}",
        status
    ))
}

fn device_not_found() -> DomainError {
    DomainError::NotFound("Device not found".to_string())
}

fn illegal_transition(from: RequestStatus, to: &str) -> DomainError {
    DomainError::InvalidTransition(format!("Cannot change request status from {} to {}", from, to))
}

/// Owns device requests and their lifecycle.
#[derive(Clone)]
pub struct DeviceRequestEngine {
    devices: Arc<dyn DeviceStore>,
    requests: Arc<dyn DeviceRequestStore>,
    notifications: NotificationDispatcher,
    policy: RequestPolicy,
}

impl DeviceRequestEngine {
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        requests: Arc<dyn DeviceRequestStore>,
        notifications: NotificationDispatcher,
        policy: RequestPolicy,
    ) -> Self {
        Self {
            devices,
            requests,
            notifications,
            policy,
        }
    }

    pub fn policy(&self) -> RequestPolicy {
        self.policy
    }

    /// Asks for a device on behalf of `actor`.
    pub async fn create_request(
        &self,
        actor: &Actor,
        payload: CreateDeviceRequestPayload,
    ) -> DomainResult<CreatedDeviceRequest> {
        payload.validate()?;
        let message = payload
            .normalized_message()
            .map_err(DomainError::InvalidInput)?;

        let device = self.load_device(payload.device_id).await?;
        self.check_availability(actor, &device)?;

        if let Some(existing) = self
            .requests
            .find_active_request(actor.user_id, device.id)
            .await?
        {
            return Err(DomainError::DuplicateRequest(Some((&existing).into())));
        }

        if self.quota_applies(actor) {
            let active = self.requests.count_active_for_requester(actor.user_id).await?;
            self.check_quota(active)?;
        }

        let request = match self
            .requests
            .insert_request(NewDeviceRequest {
                device_id: device.id,
                requester_id: actor.user_id,
                message,
            })
            .await
        {
            Ok(request) => request,
            // Lost a race with a concurrent insert for the same pair.
            Err(DomainError::DuplicateRequest(None)) => {
                let existing = self
                    .requests
                    .find_active_request(actor.user_id, device.id)
                    .await?;
                return Err(DomainError::DuplicateRequest(
                    existing.as_ref().map(Into::into),
                ));
            }
            Err(e) => return Err(e),
        };

        info!(
            request_id = %request.id,
            device_id = %device.id,
            requester_id = %actor.user_id,
            "Device request created"
        );

        self.notifications.dispatch(
            vec![Audience::User(device.owner_id), Audience::Admins],
            NotificationEvent::NewDeviceRequest {
                request_id: request.id,
                device_id: device.id,
                device_title: device.title.clone(),
                requester_id: actor.user_id,
                message: request.message.clone(),
            },
        );

        Ok(request.into())
    }

    /// Read-only pre-flight of [`Self::create_request`].
    pub async fn can_request(&self, actor: &Actor, device_id: Uuid) -> DomainResult<Eligibility> {
        let device = self.load_device(device_id).await?;
        let active_request_count = self.requests.count_active_for_requester(actor.user_id).await?;

        let blocked = match self.check_availability(actor, &device) {
            Err(e) => Some(e),
            Ok(()) => {
                if self
                    .requests
                    .find_active_request(actor.user_id, device.id)
                    .await?
                    .is_some()
                {
                    Some(DomainError::DuplicateRequest(None))
                } else if self.quota_applies(actor) {
                    self.check_quota(active_request_count).err()
                } else {
                    None
                }
            }
        };

        Ok(Eligibility {
            can_request: blocked.is_none(),
            reason: blocked.map(|e| match e {
                DomainError::DeviceNotAvailable(reason) => reason,
                other => other.to_string(),
            }),
            active_request_count,
        })
    }

    /// Moves a request along the lifecycle. Admins and the device owner only.
    pub async fn set_request_status(
        &self,
        actor: &Actor,
        request_id: Uuid,
        payload: SetRequestStatusPayload,
    ) -> DomainResult<DeviceRequest> {
        let request = self
            .requests
            .find_request(request_id)
            .await?
            .ok_or_else(request_not_found)?;
        let device = self.load_device(request.device_id).await?;

        if !(actor.is_admin() || device.is_owned_by(actor.user_id)) {
            return Err(DomainError::Forbidden(
                "Only an admin or the device owner can change this request".to_string(),
            ));
        }

        payload.validate()?;

        let next = RequestStatus::from_str(&payload.status)
            .map_err(|_| illegal_transition(request.status, &payload.status))?;
        if !request.status.can_transition_to(next) {
            return Err(illegal_transition(request.status, next.as_str()));
        }

        let rejection_reason = payload
            .rejection_reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());
        let update = StatusUpdate::for_transition(
            &request,
            next,
            actor.user_id,
            rejection_reason,
            Utc::now(),
        );

        let updated = self
            .requests
            .update_request_status(request.id, request.status, &update)
            .await?
            .ok_or_else(|| illegal_transition(request.status, next.as_str()))?;

        info!(
            request_id = %updated.id,
            device_id = %device.id,
            actor_id = %actor.user_id,
            from = %request.status,
            to = %updated.status,
            "Device request status changed"
        );

        self.notify_transition(&updated, &device);
        Ok(updated)
    }

    /// Withdraws the actor's own request.
    ///
    /// Someone else's request is reported as not found.
    pub async fn cancel_own_request(&self, actor: &Actor, request_id: Uuid) -> DomainResult<()> {
        let request = self
            .requests
            .find_request(request_id)
            .await?
            .filter(|r| r.is_owned_by(actor.user_id))
            .ok_or_else(request_not_found)?;

        let only_if = if self.policy.allow_cancel_after_decision {
            None
        } else {
            Some(RequestStatus::Pending)
        };
        if only_if.is_some_and(|status| request.status != status) {
            return Err(cancel_not_pending(request.status));
        }

        if !self.requests.delete_request(request.id, only_if).await? {
            // Decided between the read and the delete, or already gone.
            return match self.requests.find_request(request.id).await? {
                Some(current) => Err(cancel_not_pending(current.status)),
                None => Err(request_not_found()),
            };
        }

        info!(
            request_id = %request.id,
            device_id = %request.device_id,
            requester_id = %actor.user_id,
            status = %request.status,
            "Device request cancelled"
        );
        Ok(())
    }

    /// Visible to the requester, the device owner and admins.
    pub async fn get_request(&self, actor: &Actor, request_id: Uuid) -> DomainResult<DeviceRequest> {
        let request = self
            .requests
            .find_request(request_id)
            .await?
            .ok_or_else(request_not_found)?;

        if actor.is_admin() || request.is_owned_by(actor.user_id) {
            return Ok(request);
        }

        let owns_device = self
            .devices
            .find_device(request.device_id)
            .await?
            .map_or(false, |d| d.is_owned_by(actor.user_id));
        if owns_device {
            Ok(request)
        } else {
            Err(request_not_found())
        }
    }

    pub async fn list_mine(
        &self,
        actor: &Actor,
        page: PageRequest,
    ) -> DomainResult<Paginated<DeviceRequest>> {
        let filter = DeviceRequestFilter {
            requester_id: Some(actor.user_id),
            ..DeviceRequestFilter::default()
        };
        let (requests, total) = self.requests.list_requests(&filter, page).await?;
        Ok(Paginated::new(requests, page, total))
    }

    /// Requests for one device, for its owner only.
    pub async fn list_for_device(
        &self,
        actor: &Actor,
        device_id: Uuid,
        page: PageRequest,
    ) -> DomainResult<Paginated<DeviceRequest>> {
        let device = self.load_device(device_id).await?;
        if !device.is_owned_by(actor.user_id) {
            return Err(DomainError::Forbidden(
                "Only the device owner can view its requests".to_string(),
            ));
        }

        let filter = DeviceRequestFilter {
            device_id: Some(device.id),
            ..DeviceRequestFilter::default()
        };
        let (requests, total) = self.requests.list_requests(&filter, page).await?;
        Ok(Paginated::new(requests, page, total))
    }

    pub async fn list_all_for_admin(
        &self,
        actor: &Actor,
        query: &AdminDeviceRequestsQuery,
    ) -> DomainResult<Paginated<DeviceRequest>> {
        ensure_admin(actor)?;

        let page = PageRequest::new(query.page, query.limit);
        let (requests, total) = self.requests.list_requests(&query.filter(), page).await?;
        Ok(Paginated::new(requests, page, total))
    }

    async fn load_device(&self, device_id: Uuid) -> DomainResult<Device> {
        self.devices
            .find_device(device_id)
            .await?
            .ok_or_else(device_not_found)
    }

    fn check_availability(&self, actor: &Actor, device: &Device) -> DomainResult<()> {
        if !device.is_requestable() {
            return Err(DomainError::DeviceNotAvailable(
                "Device is not available for requests".to_string(),
            ));
        }
        if device.is_owned_by(actor.user_id) {
            return Err(DomainError::DeviceNotAvailable(
                "You cannot request your own device".to_string(),
            ));
        }
        Ok(())
    }

    /// The active-request cap binds requester accounts only.
    fn quota_applies(&self, actor: &Actor) -> bool {
        actor.has_role(&[Role::Requester])
    }

    fn check_quota(&self, active: i64) -> DomainResult<()> {
        if active >= self.policy.max_active_requests {
            return Err(DomainError::QuotaExceeded {
                active,
                limit: self.policy.max_active_requests,
            });
        }
        Ok(())
    }

    fn notify_transition(&self, request: &DeviceRequest, device: &Device) {
        match request.status {
            RequestStatus::Approved => {
                self.notifications.dispatch(
                    vec![Audience::User(request.requester_id)],
                    NotificationEvent::RequestApproved {
                        request_id: request.id,
                        device_id: device.id,
                        device_title: device.title.clone(),
                    },
                );
                self.notifications.dispatch(
                    vec![Audience::User(device.owner_id)],
                    NotificationEvent::HandoffRequired {
                        request_id: request.id,
                        device_id: device.id,
                        device_title: device.title.clone(),
                        requester_id: request.requester_id,
                    },
                );
            }
            RequestStatus::Rejected => self.notifications.dispatch(
                vec![Audience::User(request.requester_id)],
                NotificationEvent::RequestRejected {
                    request_id: request.id,
                    device_id: device.id,
                    device_title: device.title.clone(),
                    reason: request.rejection_reason.clone(),
                },
            ),
            RequestStatus::Pending | RequestStatus::Completed => {}
        }
    }
}
