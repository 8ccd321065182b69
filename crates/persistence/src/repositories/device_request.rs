//! Device request repository for database operations.

use async_trait::async_trait;
use domain::models::{
    DeviceRequest, DeviceRequestFilter, NewDeviceRequest, RequestStatus, StatusUpdate,
};
use domain::stores::DeviceRequestStore;
use domain::{DomainError, DomainResult};
use shared::pagination::PageRequest;
use sqlx::PgPool;
use uuid::Uuid;

use super::{is_foreign_key_violation, is_unique_violation, storage_error};
use crate::entities::{DeviceRequestEntity, RequestStatusDb};
use crate::metrics::QueryTimer;

/// Repository for device request database operations.
///
/// At most one active request per requester and device, enforced by
/// `idx_device_requests_active_pair` (partial unique index over pending and
/// approved rows).
#[derive(Clone)]
pub struct DeviceRequestRepository {
    pool: PgPool,
}

impl DeviceRequestRepository {
    /// Creates a new DeviceRequestRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn count(&self, filter: &DeviceRequestFilter) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("count_device_requests");
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM device_requests
            WHERE ($1::request_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR device_id = $2)
              AND ($3::uuid IS NULL OR requester_id = $3)
            "#,
        )
        .bind(filter.status.map(RequestStatusDb::from))
        .bind(filter.device_id)
        .bind(filter.requester_id)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }
}

#[async_trait]
impl DeviceRequestStore for DeviceRequestRepository {
    async fn insert_request(&self, request: NewDeviceRequest) -> DomainResult<DeviceRequest> {
        let timer = QueryTimer::new("insert_device_request");
        let result = sqlx::query_as::<_, DeviceRequestEntity>(
            r#"
            INSERT INTO device_requests (device_id, requester_id, message)
            VALUES ($1, $2, $3)
            RETURNING id, device_id, requester_id, message, status, approved_by, approved_at,
                      rejection_reason, completed_at, created_at, updated_at
            "#,
        )
        .bind(request.device_id)
        .bind(request.requester_id)
        .bind(&request.message)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        match result {
            Ok(entity) => Ok(entity.into()),
            Err(e) if is_unique_violation(&e) => Err(DomainError::DuplicateRequest(None)),
            Err(e) if is_foreign_key_violation(&e) => {
                Err(DomainError::NotFound("Device not found".to_string()))
            }
            Err(e) => Err(storage_error(e)),
        }
    }

    async fn find_request(&self, id: Uuid) -> DomainResult<Option<DeviceRequest>> {
        let timer = QueryTimer::new("find_device_request_by_id");
        let result = sqlx::query_as::<_, DeviceRequestEntity>(
            r#"
            SELECT id, device_id, requester_id, message, status, approved_by, approved_at,
                   rejection_reason, completed_at, created_at, updated_at
            FROM device_requests
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result.map(|e| e.map(Into::into)).map_err(storage_error)
    }

    async fn find_active_request(
        &self,
        requester_id: Uuid,
        device_id: Uuid,
    ) -> DomainResult<Option<DeviceRequest>> {
        let timer = QueryTimer::new("find_active_device_request");
        let result = sqlx::query_as::<_, DeviceRequestEntity>(
            r#"
            SELECT id, device_id, requester_id, message, status, approved_by, approved_at,
                   rejection_reason, completed_at, created_at, updated_at
            FROM device_requests
            WHERE requester_id = $1 AND device_id = $2 AND status IN ('pending', 'approved')
            "#,
        )
        .bind(requester_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result.map(|e| e.map(Into::into)).map_err(storage_error)
    }

    async fn count_active_for_requester(&self, requester_id: Uuid) -> DomainResult<i64> {
        let timer = QueryTimer::new("count_active_device_requests");
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM device_requests
            WHERE requester_id = $1 AND status IN ('pending', 'approved')
            "#,
        )
        .bind(requester_id)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        result.map_err(storage_error)
    }

    async fn update_request_status(
        &self,
        id: Uuid,
        expected: RequestStatus,
        update: &StatusUpdate,
    ) -> DomainResult<Option<DeviceRequest>> {
        let timer = QueryTimer::new("update_device_request_status");
        let result = sqlx::query_as::<_, DeviceRequestEntity>(
            r#"
            UPDATE device_requests
            SET status = $3, approved_by = $4, approved_at = $5, rejection_reason = $6,
                completed_at = $7, updated_at = $8
            WHERE id = $1 AND status = $2
            RETURNING id, device_id, requester_id, message, status, approved_by, approved_at,
                      rejection_reason, completed_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(RequestStatusDb::from(expected))
        .bind(RequestStatusDb::from(update.status))
        .bind(update.approved_by)
        .bind(update.approved_at)
        .bind(&update.rejection_reason)
        .bind(update.completed_at)
        .bind(update.updated_at)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result.map(|e| e.map(Into::into)).map_err(storage_error)
    }

    async fn delete_request(
        &self,
        id: Uuid,
        only_if: Option<RequestStatus>,
    ) -> DomainResult<bool> {
        let timer = QueryTimer::new("delete_device_request");
        let result = sqlx::query(
            "DELETE FROM device_requests WHERE id = $1 AND ($2::request_status IS NULL OR status = $2)",
        )
        .bind(id)
        .bind(only_if.map(RequestStatusDb::from))
        .execute(&self.pool)
        .await;
        timer.record();

        result
            .map(|r| r.rows_affected() > 0)
            .map_err(storage_error)
    }

    async fn list_requests(
        &self,
        filter: &DeviceRequestFilter,
        page: PageRequest,
    ) -> DomainResult<(Vec<DeviceRequest>, i64)> {
        let timer = QueryTimer::new("list_device_requests");
        let result = sqlx::query_as::<_, DeviceRequestEntity>(
            r#"
            SELECT id, device_id, requester_id, message, status, approved_by, approved_at,
                   rejection_reason, completed_at, created_at, updated_at
            FROM device_requests
            WHERE ($1::request_status IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR device_id = $2)
              AND ($3::uuid IS NULL OR requester_id = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(filter.status.map(RequestStatusDb::from))
        .bind(filter.device_id)
        .bind(filter.requester_id)
        .bind(page.limit as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await;
        timer.record();

        let requests = result.map_err(storage_error)?;
        let total = self.count(filter).await.map_err(storage_error)?;
        Ok((requests.into_iter().map(Into::into).collect(), total))
    }
}
