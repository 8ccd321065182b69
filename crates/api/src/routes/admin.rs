//! Admin moderation routes.
//!
//! Mounted behind `require_admin`; the services check the role again.

use axum::{extract::State, http::StatusCode, Json};
use domain::models::{AdminDeviceRequestsQuery, AdminDevicesQuery, Device, DeviceRequest};
use shared::pagination::Paginated;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{AppPath, AppQuery, CurrentActor};

/// Moderation queue with optional `status`, `deviceType` and `ownerId` filters.
///
/// GET /api/v1/admin/devices
pub async fn list_devices(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    AppQuery(query): AppQuery<AdminDevicesQuery>,
) -> Result<Json<Paginated<Device>>, ApiError> {
    Ok(Json(state.catalog.list_all_for_admin(&actor, &query).await?))
}

/// DELETE /api/v1/admin/devices/:id
pub async fn delete_device(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    AppPath(device_id): AppPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.catalog.delete_as_admin(&actor, device_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/admin/device-requests
pub async fn list_device_requests(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    AppQuery(query): AppQuery<AdminDeviceRequestsQuery>,
) -> Result<Json<Paginated<DeviceRequest>>, ApiError> {
    Ok(Json(state.engine.list_all_for_admin(&actor, &query).await?))
}
