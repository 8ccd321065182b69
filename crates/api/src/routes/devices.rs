//! Device catalog endpoint handlers.

use axum::{extract::State, http::StatusCode, Json};
use domain::models::{
    ApprovedDevicesQuery, CreateDeviceRequest, Device, DeviceRequest, SetDeviceStatusRequest,
    UpdateDeviceRequest,
};
use shared::pagination::Paginated;
use uuid::Uuid;

use super::PageQuery;
use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{AppJson, AppPath, AppQuery, CurrentActor, OptionalActor};

/// Post a device for donation. It starts out pending moderation.
///
/// POST /api/v1/devices
pub async fn create_device(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    AppJson(request): AppJson<CreateDeviceRequest>,
) -> Result<(StatusCode, Json<Device>), ApiError> {
    let device = state.catalog.create_device(&actor, request).await?;
    Ok((StatusCode::CREATED, Json(device)))
}

/// GET /api/v1/devices/approved?deviceType&condition&location&page&limit
pub async fn list_approved_devices(
    State(state): State<AppState>,
    AppQuery(query): AppQuery<ApprovedDevicesQuery>,
) -> Result<Json<Paginated<Device>>, ApiError> {
    Ok(Json(state.catalog.list_approved(&query).await?))
}

/// GET /api/v1/devices/my
pub async fn list_my_devices(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    AppQuery(page): AppQuery<PageQuery>,
) -> Result<Json<Paginated<Device>>, ApiError> {
    Ok(Json(state.catalog.list_mine(&actor, page.into()).await?))
}

/// GET /api/v1/devices/:id
pub async fn get_device(
    State(state): State<AppState>,
    OptionalActor(viewer): OptionalActor,
    AppPath(device_id): AppPath<Uuid>,
) -> Result<Json<Device>, ApiError> {
    let device = state.catalog.get_device(viewer.as_ref(), device_id).await?;
    Ok(Json(device))
}

/// Owner edit. Editing an approved device sends it back to moderation.
///
/// PUT /api/v1/devices/:id
pub async fn update_device(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    AppPath(device_id): AppPath<Uuid>,
    AppJson(update): AppJson<UpdateDeviceRequest>,
) -> Result<Json<Device>, ApiError> {
    let device = state.catalog.update_owned(&actor, device_id, update).await?;
    Ok(Json(device))
}

/// DELETE /api/v1/devices/:id
pub async fn delete_device(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    AppPath(device_id): AppPath<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.catalog.delete_owned(&actor, device_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Admin moderation decision.
///
/// PUT /api/v1/devices/:id/status
pub async fn set_device_status(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    AppPath(device_id): AppPath<Uuid>,
    AppJson(request): AppJson<SetDeviceStatusRequest>,
) -> Result<Json<Device>, ApiError> {
    let device = state
        .catalog
        .set_moderation_status(&actor, device_id, request)
        .await?;
    Ok(Json(device))
}

/// Requests received for one of the caller's devices.
///
/// GET /api/v1/devices/:id/requests
pub async fn list_device_requests(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    AppPath(device_id): AppPath<Uuid>,
    AppQuery(page): AppQuery<PageQuery>,
) -> Result<Json<Paginated<DeviceRequest>>, ApiError> {
    let requests = state
        .engine
        .list_for_device(&actor, device_id, page.into())
        .await?;
    Ok(Json(requests))
}
