//! Device request domain model and its lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::Validate;

use shared::validation::validate_not_blank;

/// Minimum trimmed length of a request message.
pub const MIN_MESSAGE_LENGTH: usize = 10;

/// Maximum trimmed length of a request message.
pub const MAX_MESSAGE_LENGTH: usize = 500;

/// Lifecycle state of a device request.
///
/// ```text
/// pending --approve--> approved --complete--> completed
///    |
///    +-----reject----> rejected
/// ```
/// Cancellation removes the request instead of moving it to a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Completed => "completed",
        }
    }

    /// Pending and approved requests count against the quota and block duplicates.
    pub fn is_active(&self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Approved)
    }

    /// Statuses counted as active.
    pub const ACTIVE: [RequestStatus; 2] = [RequestStatus::Pending, RequestStatus::Approved];

    /// Whether `self -> next` is an edge of the lifecycle.
    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Approved)
                | (RequestStatus::Pending, RequestStatus::Rejected)
                | (RequestStatus::Approved, RequestStatus::Completed)
        )
    }
}

impl FromStr for RequestStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "completed" => Ok(RequestStatus::Completed),
            _ => Err(format!("Invalid request status: {}", s)),
        }
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A requester's ask for a specific device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRequest {
    pub id: Uuid,
    pub device_id: Uuid,
    pub requester_id: Uuid,
    pub message: String,
    pub status: RequestStatus,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceRequest {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.requester_id == user_id
    }
}

/// Fields needed to insert a request. Status is always pending.
#[derive(Debug, Clone)]
pub struct NewDeviceRequest {
    pub device_id: Uuid,
    pub requester_id: Uuid,
    pub message: String,
}

/// The full set of status-dependent fields written by a transition.
///
/// Stores apply it as a whole so approval and rejection metadata never
/// leak across states.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub status: RequestStatus,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl StatusUpdate {
    /// Builds the update for moving `current` to `next`.
    pub fn for_transition(
        current: &DeviceRequest,
        next: RequestStatus,
        actor_id: Uuid,
        rejection_reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        match next {
            RequestStatus::Approved => Self {
                status: next,
                approved_by: Some(actor_id),
                approved_at: Some(now),
                rejection_reason: None,
                completed_at: None,
                updated_at: now,
            },
            RequestStatus::Rejected => Self {
                status: next,
                approved_by: None,
                approved_at: None,
                rejection_reason,
                completed_at: None,
                updated_at: now,
            },
            RequestStatus::Completed => Self {
                status: next,
                approved_by: current.approved_by,
                approved_at: current.approved_at,
                rejection_reason: None,
                completed_at: Some(now),
                updated_at: now,
            },
            RequestStatus::Pending => Self {
                status: next,
                approved_by: None,
                approved_at: None,
                rejection_reason: None,
                completed_at: None,
                updated_at: now,
            },
        }
    }

    pub fn apply(&self, request: &mut DeviceRequest) {
        request.status = self.status;
        request.approved_by = self.approved_by;
        request.approved_at = self.approved_at;
        request.rejection_reason = self.rejection_reason.clone();
        request.completed_at = self.completed_at;
        request.updated_at = self.updated_at;
    }
}

/// Request payload for asking for a device.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeviceRequestPayload {
    pub device_id: Uuid,

    #[validate(custom(function = "validate_not_blank"))]
    pub message: String,
}

impl CreateDeviceRequestPayload {
    /// Trimmed message, checked against the length bounds.
    pub fn normalized_message(&self) -> Result<String, String> {
        let message = self.message.trim();
        let len = message.chars().count();
        if !(MIN_MESSAGE_LENGTH..=MAX_MESSAGE_LENGTH).contains(&len) {
            return Err(format!(
                "Message must be between {} and {} characters",
                MIN_MESSAGE_LENGTH, MAX_MESSAGE_LENGTH
            ));
        }
        Ok(message.to_string())
    }
}

/// Request payload for approve/reject/complete.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetRequestStatusPayload {
    pub status: String,

    #[validate(length(max = 500, message = "Rejection reason must be at most 500 characters"))]
    pub rejection_reason: Option<String>,
}

/// A newly created request as returned to its requester.
///
/// The requester id is omitted; the caller already knows who they are.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedDeviceRequest {
    pub id: Uuid,
    pub device_id: Uuid,
    pub message: String,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
}

impl From<DeviceRequest> for CreatedDeviceRequest {
    fn from(request: DeviceRequest) -> Self {
        Self {
            id: request.id,
            device_id: request.device_id,
            message: request.message,
            status: request.status,
            created_at: request.created_at,
        }
    }
}

/// Summary of the active request that blocked a duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExistingRequest {
    pub id: Uuid,
    pub status: RequestStatus,
    pub message: String,
}

impl From<&DeviceRequest> for ExistingRequest {
    fn from(request: &DeviceRequest) -> Self {
        Self {
            id: request.id,
            status: request.status,
            message: request.message.clone(),
        }
    }
}

/// Answer to "can this user request this device?".
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Eligibility {
    pub can_request: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub active_request_count: i64,
}

/// Tunables of the request engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct RequestPolicy {
    /// Active requests a requester may hold at once.
    #[serde(default = "default_max_active_requests")]
    pub max_active_requests: i64,

    /// When false, only pending requests can be cancelled.
    #[serde(default = "default_allow_cancel_after_decision")]
    pub allow_cancel_after_decision: bool,
}

fn default_max_active_requests() -> i64 {
    3
}

fn default_allow_cancel_after_decision() -> bool {
    true
}

impl Default for RequestPolicy {
    fn default() -> Self {
        Self {
            max_active_requests: default_max_active_requests(),
            allow_cancel_after_decision: default_allow_cancel_after_decision(),
        }
    }
}

/// Filters for request queries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceRequestFilter {
    pub status: Option<RequestStatus>,
    pub device_id: Option<Uuid>,
    pub requester_id: Option<Uuid>,
}

impl DeviceRequestFilter {
    pub fn matches(&self, request: &DeviceRequest) -> bool {
        self.status.map_or(true, |s| request.status == s)
            && self.device_id.map_or(true, |d| request.device_id == d)
            && self.requester_id.map_or(true, |r| request.requester_id == r)
    }
}

/// Query parameters for the admin request listing.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminDeviceRequestsQuery {
    pub status: Option<RequestStatus>,
    pub device_id: Option<Uuid>,
    pub requester_id: Option<Uuid>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl AdminDeviceRequestsQuery {
    pub fn filter(&self) -> DeviceRequestFilter {
        DeviceRequestFilter {
            status: self.status,
            device_id: self.device_id,
            requester_id: self.requester_id,
        }
    }
}
