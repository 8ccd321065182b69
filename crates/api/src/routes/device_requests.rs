//! Device request endpoint handlers.

use axum::{extract::State, http::StatusCode, Json};
use domain::models::{
    CreateDeviceRequestPayload, CreatedDeviceRequest, DeviceRequest, Eligibility,
    SetRequestStatusPayload,
};
use serde::Serialize;
use shared::pagination::Paginated;
use uuid::Uuid;

use super::PageQuery;
use crate::app::AppState;
use crate::error::ApiError;
use crate::extractors::{AppJson, AppPath, AppQuery, CurrentActor};
use crate::middleware::metrics::{record_device_request_created, record_device_request_transition};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequestResponse {
    pub id: Uuid,
    pub message: String,
}

/// POST /api/v1/device-requests
pub async fn create_request(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    AppJson(payload): AppJson<CreateDeviceRequestPayload>,
) -> Result<(StatusCode, Json<CreatedDeviceRequest>), ApiError> {
    let created = state.engine.create_request(&actor, payload).await?;
    record_device_request_created();
    Ok((StatusCode::CREATED, Json(created)))
}

/// Pre-flight for the "request this device" button.
///
/// GET /api/v1/device-requests/can-request/:deviceId
pub async fn can_request(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    AppPath(device_id): AppPath<Uuid>,
) -> Result<Json<Eligibility>, ApiError> {
    Ok(Json(state.engine.can_request(&actor, device_id).await?))
}

/// GET /api/v1/device-requests/my
pub async fn list_my_requests(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    AppQuery(page): AppQuery<PageQuery>,
) -> Result<Json<Paginated<DeviceRequest>>, ApiError> {
    Ok(Json(state.engine.list_mine(&actor, page.into()).await?))
}

/// DELETE /api/v1/device-requests/my/:id
pub async fn cancel_my_request(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    AppPath(request_id): AppPath<Uuid>,
) -> Result<Json<CancelRequestResponse>, ApiError> {
    state.engine.cancel_own_request(&actor, request_id).await?;
    Ok(Json(CancelRequestResponse {
        id: request_id,
        message: "Request cancelled".to_string(),
    }))
}

/// GET /api/v1/device-requests/:id
pub async fn get_request(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    AppPath(request_id): AppPath<Uuid>,
) -> Result<Json<DeviceRequest>, ApiError> {
    Ok(Json(state.engine.get_request(&actor, request_id).await?))
}

/// Approve, reject or complete. Admins and the device owner only.
///
/// PUT /api/v1/device-requests/:id/status
pub async fn set_request_status(
    State(state): State<AppState>,
    CurrentActor(actor): CurrentActor,
    AppPath(request_id): AppPath<Uuid>,
    AppJson(payload): AppJson<SetRequestStatusPayload>,
) -> Result<Json<DeviceRequest>, ApiError> {
    let request = state
        .engine
        .set_request_status(&actor, request_id, payload)
        .await?;
    record_device_request_transition(request.status);
    Ok(Json(request))
}

