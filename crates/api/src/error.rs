use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::models::ExistingRequest;
use domain::DomainError;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Device not available: {0}")]
    DeviceNotAvailable(String),

    #[error("Duplicate request")]
    DuplicateRequest(Option<ExistingRequest>),

    #[error("Quota exceeded: {active}/{limit}")]
    QuotaExceeded { active: i64, limit: i64 },

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg, None),
            ApiError::Validation(msg) => (StatusCode::BAD_REQUEST, "invalid_input", msg, None),
            ApiError::DeviceNotAvailable(reason) => (
                StatusCode::BAD_REQUEST,
                "device_not_available",
                reason,
                None,
            ),
            ApiError::DuplicateRequest(existing) => (
                StatusCode::BAD_REQUEST,
                "duplicate_request",
                "You already have an active request for this device".into(),
                existing.map(|e| json!({ "existingRequest": e })),
            ),
            ApiError::QuotaExceeded { active, limit } => (
                StatusCode::BAD_REQUEST,
                "quota_exceeded",
                format!("Maximum of {} active requests reached", limit),
                Some(json!({ "activeRequestCount": active, "limit": limit })),
            ),
            ApiError::InvalidTransition(reason) => (
                StatusCode::BAD_REQUEST,
                "invalid_transition",
                reason,
                None,
            ),
            ApiError::InvalidStatus(reason) => {
                (StatusCode::BAD_REQUEST, "invalid_status", reason, None)
            }
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg, None),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "rate_limited",
                "Too many requests. Please try again later.".into(),
                None,
            ),
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".into(),
                    None,
                )
            }
            ApiError::ServiceUnavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
                msg,
                None,
            ),
        };

        let body = ErrorBody {
            error: error_code.into(),
            message,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InvalidInput(msg) => ApiError::Validation(msg),
            DomainError::NotFound(msg) => ApiError::NotFound(msg),
            DomainError::Forbidden(msg) => ApiError::Forbidden(msg),
            DomainError::DeviceNotAvailable(reason) => ApiError::DeviceNotAvailable(reason),
            DomainError::DuplicateRequest(existing) => ApiError::DuplicateRequest(existing),
            DomainError::QuotaExceeded { active, limit } => {
                ApiError::QuotaExceeded { active, limit }
            }
            DomainError::InvalidTransition(reason) => ApiError::InvalidTransition(reason),
            DomainError::InvalidStatus(reason) => ApiError::InvalidStatus(reason),
            DomainError::Conflict(msg) => ApiError::Conflict(msg),
            DomainError::Storage(msg) => ApiError::Internal(format!("Storage error: {}", msg)),
        }
    }
}

impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        DomainError::from(errors).into()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use domain::models::RequestStatus;
    use uuid::Uuid;

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_api_error_status_codes() {
        let cases = vec![
            (ApiError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (ApiError::Forbidden("x".into()), StatusCode::FORBIDDEN),
            (ApiError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (ApiError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::DeviceNotAvailable("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::DuplicateRequest(None), StatusCode::BAD_REQUEST),
            (
                ApiError::QuotaExceeded { active: 3, limit: 3 },
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::InvalidTransition("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::InvalidStatus("x".into()), StatusCode::BAD_REQUEST),
            (ApiError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
            (ApiError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ApiError::ServiceUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[tokio::test]
    async fn test_duplicate_request_body_carries_existing() {
        let existing = ExistingRequest {
            id: Uuid::nil(),
            status: RequestStatus::Pending,
            message: "I need this for school work".to_string(),
        };
        let body = body_json(ApiError::DuplicateRequest(Some(existing)).into_response()).await;

        assert_eq!(body["error"], "duplicate_request");
        assert_eq!(
            body["details"]["existingRequest"]["id"],
            Uuid::nil().to_string()
        );
        assert_eq!(body["details"]["existingRequest"]["status"], "pending");
    }

    #[tokio::test]
    async fn test_quota_body() {
        let body =
            body_json(ApiError::QuotaExceeded { active: 3, limit: 3 }.into_response()).await;
        assert_eq!(body["error"], "quota_exceeded");
        assert_eq!(body["message"], "Maximum of 3 active requests reached");
        assert_eq!(body["details"]["activeRequestCount"], 3);
    }

    #[tokio::test]
    async fn test_internal_error_hides_message() {
        let body = body_json(ApiError::Internal("db password wrong".into()).into_response()).await;
        assert_eq!(body["error"], "internal_error");
        assert_eq!(body["message"], "An internal error occurred");
        assert!(body.get("details").is_none());
    }

    #[test]
    fn test_from_domain_error() {
        assert!(matches!(
            ApiError::from(DomainError::InvalidInput("x".into())),
            ApiError::Validation(_)
        ));
        assert!(matches!(
            ApiError::from(DomainError::Storage("x".into())),
            ApiError::Internal(_)
        ));
        assert!(matches!(
            ApiError::from(DomainError::QuotaExceeded { active: 3, limit: 3 }),
            ApiError::QuotaExceeded { active: 3, limit: 3 }
        ));
        assert!(matches!(
            ApiError::from(DomainError::InvalidTransition("x".into())),
            ApiError::InvalidTransition(_)
        ));
        assert!(matches!(
            ApiError::from(DomainError::Conflict("x".into())),
            ApiError::Conflict(_)
        ));
    }

    #[tokio::test]
    async fn test_conflict_status() {
        let response = ApiError::Conflict("Device changed".into()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body = body_json(response).await;
        assert_eq!(body["error"], "conflict");
        assert_eq!(body["message"], "Device changed");
    }
}
