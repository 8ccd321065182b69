//! Device repository for database operations.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::models::{Device, DeviceFilter, NewDevice};
use domain::stores::DeviceStore;
use domain::DomainResult;
use shared::pagination::PageRequest;
use sqlx::PgPool;
use uuid::Uuid;

use super::{escape_like, storage_error};
use crate::entities::{DeviceConditionDb, DeviceEntity, DeviceTypeDb, ModerationStatusDb};
use crate::metrics::QueryTimer;

/// Repository for device-related database operations.
#[derive(Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

impl DeviceRepository {
    /// Creates a new DeviceRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn count(&self, filter: &DeviceFilter) -> Result<i64, sqlx::Error> {
        let timer = QueryTimer::new("count_devices");
        let result = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM devices
            WHERE ($1::moderation_status IS NULL OR status = $1)
              AND ($2::boolean IS NULL OR is_active = $2)
              AND ($3::device_type IS NULL OR device_type = $3)
              AND ($4::device_condition IS NULL OR condition = $4)
              AND ($5::uuid IS NULL OR owner_id = $5)
              AND ($6::text IS NULL
                   OR location_city ILIKE '%' || $6 || '%'
                   OR location_state ILIKE '%' || $6 || '%'
                   OR location_country ILIKE '%' || $6 || '%')
            "#,
        )
        .bind(filter.status.map(ModerationStatusDb::from))
        .bind(filter.is_active)
        .bind(filter.device_type.map(DeviceTypeDb::from))
        .bind(filter.condition.map(DeviceConditionDb::from))
        .bind(filter.owner_id)
        .bind(filter.location.as_deref().map(escape_like))
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }
}

#[async_trait]
impl DeviceStore for DeviceRepository {
    async fn insert_device(&self, device: NewDevice) -> DomainResult<Device> {
        let location = device.location.unwrap_or_default();
        let contact = device.contact_info.unwrap_or_default();

        let timer = QueryTimer::new("insert_device");
        let result = sqlx::query_as::<_, DeviceEntity>(
            r#"
            INSERT INTO devices (owner_id, title, description, device_type, condition,
                                 location_city, location_state, location_country,
                                 contact_email, contact_phone, photos)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING id, owner_id, title, description, device_type, condition,
                      location_city, location_state, location_country,
                      contact_email, contact_phone, photos, status, is_active,
                      admin_notes, approved_by, approved_at, rejection_reason,
                      created_at, updated_at
            "#,
        )
        .bind(device.owner_id)
        .bind(&device.title)
        .bind(&device.description)
        .bind(DeviceTypeDb::from(device.device_type))
        .bind(DeviceConditionDb::from(device.condition))
        .bind(location.city)
        .bind(location.state)
        .bind(location.country)
        .bind(contact.email)
        .bind(contact.phone)
        .bind(&device.photos)
        .fetch_one(&self.pool)
        .await;
        timer.record();

        result.map(Into::into).map_err(storage_error)
    }

    async fn find_device(&self, id: Uuid) -> DomainResult<Option<Device>> {
        let timer = QueryTimer::new("find_device_by_id");
        let result = sqlx::query_as::<_, DeviceEntity>(
            r#"
            SELECT id, owner_id, title, description, device_type, condition,
                   location_city, location_state, location_country,
                   contact_email, contact_phone, photos, status, is_active,
                   admin_notes, approved_by, approved_at, rejection_reason,
                   created_at, updated_at
            FROM devices
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result.map(|e| e.map(Into::into)).map_err(storage_error)
    }

    async fn list_devices(
        &self,
        filter: &DeviceFilter,
        page: PageRequest,
    ) -> DomainResult<(Vec<Device>, i64)> {
        let timer = QueryTimer::new("list_devices");
        let result = sqlx::query_as::<_, DeviceEntity>(
            r#"
            SELECT id, owner_id, title, description, device_type, condition,
                   location_city, location_state, location_country,
                   contact_email, contact_phone, photos, status, is_active,
                   admin_notes, approved_by, approved_at, rejection_reason,
                   created_at, updated_at
            FROM devices
            WHERE ($1::moderation_status IS NULL OR status = $1)
              AND ($2::boolean IS NULL OR is_active = $2)
              AND ($3::device_type IS NULL OR device_type = $3)
              AND ($4::device_condition IS NULL OR condition = $4)
              AND ($5::uuid IS NULL OR owner_id = $5)
              AND ($6::text IS NULL
                   OR location_city ILIKE '%' || $6 || '%'
                   OR location_state ILIKE '%' || $6 || '%'
                   OR location_country ILIKE '%' || $6 || '%')
            ORDER BY created_at DESC
            LIMIT $7 OFFSET $8
            "#,
        )
        .bind(filter.status.map(ModerationStatusDb::from))
        .bind(filter.is_active)
        .bind(filter.device_type.map(DeviceTypeDb::from))
        .bind(filter.condition.map(DeviceConditionDb::from))
        .bind(filter.owner_id)
        .bind(filter.location.as_deref().map(escape_like))
        .bind(page.limit as i64)
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await;
        timer.record();

        let devices = result.map_err(storage_error)?;
        let total = self.count(filter).await.map_err(storage_error)?;
        Ok((devices.into_iter().map(Into::into).collect(), total))
    }

    async fn update_device(
        &self,
        device: &Device,
        expected_updated_at: DateTime<Utc>,
    ) -> DomainResult<Option<Device>> {
        let location = device.location.clone().unwrap_or_default();
        let contact = device.contact_info.clone().unwrap_or_default();

        let timer = QueryTimer::new("update_device");
        let result = sqlx::query_as::<_, DeviceEntity>(
            r#"
            UPDATE devices
            SET title = $2, description = $3, device_type = $4, condition = $5,
                location_city = $6, location_state = $7, location_country = $8,
                contact_email = $9, contact_phone = $10, photos = $11,
                status = $12, is_active = $13, admin_notes = $14,
                approved_by = $15, approved_at = $16, rejection_reason = $17,
                updated_at = $18
            WHERE id = $1 AND updated_at = $19
            RETURNING id, owner_id, title, description, device_type, condition,
                      location_city, location_state, location_country,
                      contact_email, contact_phone, photos, status, is_active,
                      admin_notes, approved_by, approved_at, rejection_reason,
                      created_at, updated_at
            "#,
        )
        .bind(device.id)
        .bind(&device.title)
        .bind(&device.description)
        .bind(DeviceTypeDb::from(device.device_type))
        .bind(DeviceConditionDb::from(device.condition))
        .bind(location.city)
        .bind(location.state)
        .bind(location.country)
        .bind(contact.email)
        .bind(contact.phone)
        .bind(&device.photos)
        .bind(ModerationStatusDb::from(device.status))
        .bind(device.is_active)
        .bind(&device.admin_notes)
        .bind(device.approved_by)
        .bind(device.approved_at)
        .bind(&device.rejection_reason)
        .bind(device.updated_at)
        .bind(expected_updated_at)
        .fetch_optional(&self.pool)
        .await;
        timer.record();

        result.map(|e| e.map(Into::into)).map_err(storage_error)
    }

    async fn delete_device(&self, id: Uuid) -> DomainResult<bool> {
        // device_requests rows go with it (ON DELETE CASCADE).
        let timer = QueryTimer::new("delete_device");
        let result = sqlx::query("DELETE FROM devices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await;
        timer.record();

        result
            .map(|r| r.rows_affected() > 0)
            .map_err(storage_error)
    }
}
