//! Device request entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{DeviceRequest, RequestStatus};
use sqlx::FromRow;
use uuid::Uuid;

/// Database enum for device request status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "request_status", rename_all = "lowercase")]
pub enum RequestStatusDb {
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl From<RequestStatusDb> for RequestStatus {
    fn from(value: RequestStatusDb) -> Self {
        match value {
            RequestStatusDb::Pending => RequestStatus::Pending,
            RequestStatusDb::Approved => RequestStatus::Approved,
            RequestStatusDb::Rejected => RequestStatus::Rejected,
            RequestStatusDb::Completed => RequestStatus::Completed,
        }
    }
}

impl From<RequestStatus> for RequestStatusDb {
    fn from(value: RequestStatus) -> Self {
        match value {
            RequestStatus::Pending => RequestStatusDb::Pending,
            RequestStatus::Approved => RequestStatusDb::Approved,
            RequestStatus::Rejected => RequestStatusDb::Rejected,
            RequestStatus::Completed => RequestStatusDb::Completed,
        }
    }
}

/// Database row mapping for the device_requests table.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceRequestEntity {
    pub id: Uuid,
    pub device_id: Uuid,
    pub requester_id: Uuid,
    pub message: String,
    pub status: RequestStatusDb,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DeviceRequestEntity> for DeviceRequest {
    fn from(entity: DeviceRequestEntity) -> Self {
        Self {
            id: entity.id,
            device_id: entity.device_id,
            requester_id: entity.requester_id,
            message: entity.message,
            status: entity.status.into(),
            approved_by: entity.approved_by,
            approved_at: entity.approved_at,
            rejection_reason: entity.rejection_reason,
            completed_at: entity.completed_at,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
